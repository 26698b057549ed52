//! Cyclomatic complexity per file.
//!
//! Files with a tree-sitter grammar are measured on the syntax tree (see
//! `syntax`). Other files, or builds without the `tree-sitter` feature, use a
//! text estimate calculated as:
//! - Start at 1
//! - Add 1 for each: if, for, while, case, catch, elif, except, &&, ||, ternary `?`
//!
//! Comment lines are ignored. This is an estimate over whole files, not a
//! per-function measure; it is meant to surface files that need splitting.

use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use super::syntax::syntax_complexity;
use super::{relative_path, Analyzer, AnalyzerData, ScanContext, COMPLEXITY};

lazy_static! {
    static ref DECISION_POINT: Regex =
        Regex::new(r"\b(?:if|for|while|case|catch|elif|except)\b|&&|\|\||\s\?\s").unwrap();
}

/// Complexity of a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileComplexity {
    pub path: String,
    pub complexity: u32,
    pub lines: usize,
}

/// Payload produced by the complexity analyzer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityData {
    pub files: Vec<FileComplexity>,
    /// Per-file limit the scan ran with
    pub max_file_complexity: u32,
    #[serde(default)]
    pub skipped_files: Vec<String>,
}

impl ComplexityData {
    pub fn files_analyzed(&self) -> usize {
        self.files.len()
    }

    pub fn average_complexity(&self) -> f64 {
        if self.files.is_empty() {
            return 0.0;
        }
        self.files.iter().map(|f| f.complexity as f64).sum::<f64>() / self.files.len() as f64
    }

    pub fn max_complexity(&self) -> u32 {
        self.files.iter().map(|f| f.complexity).max().unwrap_or(0)
    }

    /// Files above the configured limit.
    pub fn over_limit(&self) -> impl Iterator<Item = &FileComplexity> {
        self.files
            .iter()
            .filter(move |f| f.complexity > self.max_file_complexity)
    }
}

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("//")
        || trimmed.starts_with('#')
        || trimmed.starts_with("/*")
        || trimmed.starts_with('*')
}

/// Measure a file, preferring the syntax tree over the text estimate.
pub fn file_complexity(path: &Path, source: &str) -> u32 {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(|ext| syntax_complexity(ext, source))
        .unwrap_or_else(|| estimate_complexity(source))
}

/// Estimate cyclomatic complexity of a source text.
pub fn estimate_complexity(source: &str) -> u32 {
    let decisions: usize = source
        .lines()
        .filter(|l| !is_comment(l))
        .map(|l| DECISION_POINT.find_iter(l).count())
        .sum();
    1 + decisions as u32
}

fn measure_files(root: &Path, files: &[std::path::PathBuf]) -> (Vec<FileComplexity>, Vec<String>) {
    let measured: Vec<Result<FileComplexity, String>> = files
        .par_iter()
        .map(|path| {
            let rel = relative_path(root, path).to_string_lossy().to_string();
            match std::fs::read_to_string(path) {
                Ok(source) => Ok(FileComplexity {
                    complexity: file_complexity(path, &source),
                    lines: source.lines().count(),
                    path: rel,
                }),
                Err(e) => {
                    warn!("skipping unreadable file {}: {}", path.display(), e);
                    Err(rel)
                }
            }
        })
        .collect();

    let mut ok = Vec::new();
    let mut skipped = Vec::new();
    for m in measured {
        match m {
            Ok(f) => ok.push(f),
            Err(rel) => skipped.push(rel),
        }
    }
    (ok, skipped)
}

pub struct ComplexityAnalyzer;

#[async_trait::async_trait]
impl Analyzer for ComplexityAnalyzer {
    fn name(&self) -> &'static str {
        COMPLEXITY
    }

    async fn analyze(&self, ctx: &ScanContext) -> anyhow::Result<AnalyzerData> {
        let root = ctx.project_path().to_path_buf();
        let files = ctx.source_files();
        let limit = ctx.config.complexity.max_file_complexity;

        let (measured, skipped) =
            tokio::task::spawn_blocking(move || measure_files(&root, &files)).await?;

        if ctx.debug() {
            debug!(
                "{}: {} files measured, {} skipped",
                ctx.project.name,
                measured.len(),
                skipped.len()
            );
        }

        Ok(AnalyzerData::Complexity(ComplexityData {
            files: measured,
            max_file_complexity: limit,
            skipped_files: skipped,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::context_for;
    use crate::workspace::ProjectKind;
    use tempfile::TempDir;

    #[test]
    fn test_estimate_complexity() {
        let source = r#"
function process(x) {
    // if this comment counted the estimate would be wrong
    if (x > 0) {
        for (let i = 0; i < x; i++) {
            if (i % 2 === 0 && i > 5) {
                return i;
            }
        }
    }
    return x > 10 ? 1 : 0;
}
"#;
        // 1 (base) + 2 (if) + 1 (for) + 1 (&&) + 1 (ternary) = 6
        assert_eq!(estimate_complexity(source), 6);
    }

    #[test]
    fn test_straight_line_code() {
        assert_eq!(estimate_complexity("let a = 1;\nlet b = a + 2;\n"), 1);
        // identifiers containing keywords are not decision points
        assert_eq!(estimate_complexity("let iffy = format(forest);"), 1);
    }

    #[test]
    fn test_file_without_grammar_uses_estimate() {
        let source = "if a and b:\n    pass\n";
        assert_eq!(file_complexity(Path::new("notes.txt"), source), 2);
    }

    #[test]
    fn test_data_helpers() {
        let data = ComplexityData {
            files: vec![
                FileComplexity {
                    path: "a.ts".to_string(),
                    complexity: 4,
                    lines: 10,
                },
                FileComplexity {
                    path: "b.ts".to_string(),
                    complexity: 30,
                    lines: 200,
                },
            ],
            max_file_complexity: 20,
            skipped_files: vec![],
        };
        assert_eq!(data.files_analyzed(), 2);
        assert_eq!(data.max_complexity(), 30);
        assert!((data.average_complexity() - 17.0).abs() < f64::EPSILON);
        let over: Vec<_> = data.over_limit().map(|f| f.path.as_str()).collect();
        assert_eq!(over, vec!["b.ts"]);
    }

    #[tokio::test]
    async fn test_analyzer_measures_project() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("src")).unwrap();
        std::fs::write(
            temp.path().join("src/main.ts"),
            "if (a) { run(); }\nwhile (b) { step(); }\n",
        )
        .unwrap();

        let ctx = context_for(temp.path(), ProjectKind::Application);
        let result = ComplexityAnalyzer.run(&ctx).await;
        assert!(result.success);
        let Some(AnalyzerData::Complexity(data)) = result.data else {
            panic!("expected complexity payload");
        };
        assert_eq!(data.files.len(), 1);
        assert_eq!(data.files[0].path, "src/main.ts");
        assert_eq!(data.files[0].complexity, 3);
        assert_eq!(data.max_file_complexity, 20);
    }
}
