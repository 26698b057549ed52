//! Type-system escape hatches.
//!
//! Counts places where code opts out of static checking: explicit `any` in
//! TypeScript, checker suppression comments, lint disables and Rust `unsafe`.

use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{relative_path, Analyzer, AnalyzerData, ScanContext, TYPE_SAFETY};

lazy_static! {
    static ref EXPLICIT_ANY: Regex = Regex::new(r":\s*any\b|\bas\s+any\b|<any>").unwrap();
    static ref IGNORE_DIRECTIVE: Regex =
        Regex::new(r"@ts-ignore|@ts-expect-error|#\s*type:\s*ignore").unwrap();
    static ref NO_CHECK: Regex = Regex::new(r"@ts-nocheck").unwrap();
    static ref LINT_DISABLE: Regex =
        Regex::new(r"eslint-disable|#\[allow\(clippy::|noqa\b").unwrap();
    static ref UNSAFE: Regex = Regex::new(r"\bunsafe\s*(?:\{|fn\b|impl\b)").unwrap();
}

const TYPESCRIPT_EXTENSIONS: &[&str] = &["ts", "tsx", "vue", "svelte"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EscapeKind {
    /// `: any`, `as any` or `<any>`
    ExplicitAny,
    /// `@ts-ignore`, `@ts-expect-error`, `# type: ignore`
    IgnoreDirective,
    /// `@ts-nocheck` disables checking for the whole file
    NoCheck,
    LintDisable,
    Unsafe,
}

impl EscapeKind {
    pub const ALL: [EscapeKind; 5] = [
        EscapeKind::ExplicitAny,
        EscapeKind::IgnoreDirective,
        EscapeKind::NoCheck,
        EscapeKind::LintDisable,
        EscapeKind::Unsafe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EscapeKind::ExplicitAny => "explicit-any",
            EscapeKind::IgnoreDirective => "ignore-directive",
            EscapeKind::NoCheck => "no-check",
            EscapeKind::LintDisable => "lint-disable",
            EscapeKind::Unsafe => "unsafe",
        }
    }

    fn pattern(&self) -> &'static Regex {
        match self {
            EscapeKind::ExplicitAny => &EXPLICIT_ANY,
            EscapeKind::IgnoreDirective => &IGNORE_DIRECTIVE,
            EscapeKind::NoCheck => &NO_CHECK,
            EscapeKind::LintDisable => &LINT_DISABLE,
            EscapeKind::Unsafe => &UNSAFE,
        }
    }

    fn applies_to(&self, ext: &str) -> bool {
        match self {
            EscapeKind::ExplicitAny | EscapeKind::NoCheck => TYPESCRIPT_EXTENSIONS.contains(&ext),
            EscapeKind::Unsafe => ext == "rs",
            EscapeKind::IgnoreDirective | EscapeKind::LintDisable => true,
        }
    }
}

impl fmt::Display for EscapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscapeKind::ExplicitAny => write!(f, "explicit any"),
            EscapeKind::IgnoreDirective => write!(f, "ignore directive"),
            EscapeKind::NoCheck => write!(f, "nocheck"),
            EscapeKind::LintDisable => write!(f, "lint disable"),
            EscapeKind::Unsafe => write!(f, "unsafe"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscapeFinding {
    pub kind: EscapeKind,
    pub path: String,
    /// 1-based
    pub line: usize,
}

/// Payload produced by the type-safety analyzer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSafetyData {
    pub findings: Vec<EscapeFinding>,
    pub files_scanned: usize,
    pub total_lines: usize,
    #[serde(default)]
    pub skipped_files: Vec<String>,
}

impl TypeSafetyData {
    pub fn count(&self, kind: EscapeKind) -> usize {
        self.findings.iter().filter(|f| f.kind == kind).count()
    }

    /// Escapes per thousand lines scanned.
    pub fn escapes_per_kloc(&self) -> f64 {
        if self.total_lines == 0 {
            return 0.0;
        }
        self.findings.len() as f64 * 1000.0 / self.total_lines as f64
    }
}

/// Find escape hatches in one file's text.
pub fn scan_source(path: &str, ext: &str, source: &str) -> Vec<EscapeFinding> {
    let kinds: Vec<EscapeKind> = EscapeKind::ALL
        .into_iter()
        .filter(|k| k.applies_to(ext))
        .collect();

    let mut findings = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        for kind in &kinds {
            for _ in kind.pattern().find_iter(line) {
                findings.push(EscapeFinding {
                    kind: *kind,
                    path: path.to_string(),
                    line: idx + 1,
                });
            }
        }
    }
    findings
}

fn scan_files(root: &Path, files: &[PathBuf]) -> TypeSafetyData {
    let scanned: Vec<Result<(Vec<EscapeFinding>, usize), String>> = files
        .par_iter()
        .map(|path| {
            let rel = relative_path(root, path).to_string_lossy().to_string();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            match std::fs::read_to_string(path) {
                Ok(source) => Ok((scan_source(&rel, ext, &source), source.lines().count())),
                Err(e) => {
                    warn!("skipping unreadable file {}: {}", path.display(), e);
                    Err(rel)
                }
            }
        })
        .collect();

    let mut data = TypeSafetyData::default();
    for s in scanned {
        match s {
            Ok((findings, lines)) => {
                data.findings.extend(findings);
                data.files_scanned += 1;
                data.total_lines += lines;
            }
            Err(rel) => data.skipped_files.push(rel),
        }
    }
    data
}

pub struct TypeSafetyAnalyzer;

#[async_trait::async_trait]
impl Analyzer for TypeSafetyAnalyzer {
    fn name(&self) -> &'static str {
        TYPE_SAFETY
    }

    async fn analyze(&self, ctx: &ScanContext) -> anyhow::Result<AnalyzerData> {
        let root = ctx.project_path().to_path_buf();
        let files = ctx.source_files();

        let data = tokio::task::spawn_blocking(move || scan_files(&root, &files)).await?;
        if ctx.debug() {
            debug!(
                "{}: {} escapes in {} lines",
                ctx.project.name,
                data.findings.len(),
                data.total_lines
            );
        }

        Ok(AnalyzerData::TypeSafety(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::context_for;
    use crate::workspace::ProjectKind;
    use tempfile::TempDir;

    #[test]
    fn test_typescript_escapes() {
        let source = "\
// @ts-nocheck
const a: any = load();
const b = a as any;
// @ts-ignore
call(b);
/* eslint-disable no-console */
const company = 'anything';
";
        let findings = scan_source("src/a.ts", "ts", source);
        let kinds: Vec<_> = findings.iter().map(|f| (f.kind, f.line)).collect();
        assert_eq!(
            kinds,
            vec![
                (EscapeKind::NoCheck, 1),
                (EscapeKind::ExplicitAny, 2),
                (EscapeKind::ExplicitAny, 3),
                (EscapeKind::IgnoreDirective, 4),
                (EscapeKind::LintDisable, 6),
            ]
        );
    }

    #[test]
    fn test_language_specific_kinds() {
        // `any` only means something in TypeScript
        assert!(scan_source("a.py", "py", "def f(x: any): pass").is_empty());

        let rust = scan_source("lib.rs", "rs", "unsafe { ptr.read() }\nlet unsafe_count = 0;\n");
        assert_eq!(rust.len(), 1);
        assert_eq!(rust[0].kind, EscapeKind::Unsafe);

        let py = scan_source("a.py", "py", "x = f()  # type: ignore\n");
        assert_eq!(py[0].kind, EscapeKind::IgnoreDirective);
    }

    #[test]
    fn test_density() {
        let data = TypeSafetyData {
            findings: vec![
                EscapeFinding {
                    kind: EscapeKind::ExplicitAny,
                    path: "a.ts".to_string(),
                    line: 1,
                };
                3
            ],
            files_scanned: 1,
            total_lines: 600,
            skipped_files: vec![],
        };
        assert!((data.escapes_per_kloc() - 5.0).abs() < 1e-9);
        assert_eq!(data.count(EscapeKind::ExplicitAny), 3);
        assert_eq!(data.count(EscapeKind::Unsafe), 0);
        assert_eq!(TypeSafetyData::default().escapes_per_kloc(), 0.0);
    }

    #[tokio::test]
    async fn test_analyzer_scans_project() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("src")).unwrap();
        std::fs::write(temp.path().join("src/index.ts"), "export const x: any = 1;\nexport {};\n").unwrap();

        let ctx = context_for(temp.path(), ProjectKind::Library);
        let result = TypeSafetyAnalyzer.run(&ctx).await;
        let Some(AnalyzerData::TypeSafety(data)) = result.data else {
            panic!("expected type-safety payload");
        };
        assert_eq!(data.files_scanned, 1);
        assert_eq!(data.total_lines, 2);
        assert_eq!(data.findings.len(), 1);
        assert_eq!(data.findings[0].path, "src/index.ts");
    }
}
