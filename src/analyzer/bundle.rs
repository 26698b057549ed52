//! Build output size for applications.
//!
//! Looks for emitted JavaScript and CSS under the configured output
//! directories. A project with no build output cannot be measured, so the
//! analyzer fails and the report lists it as unavailable.

use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::workspace::ProjectKind;

use super::{relative_path, Analyzer, AnalyzerData, ScanContext, BUNDLE_SIZE};

const BUNDLE_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "css"];

/// One emitted asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleFile {
    pub path: String,
    pub size_bytes: u64,
}

/// Payload produced by the bundle-size analyzer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleData {
    /// Assets, largest first
    pub files: Vec<BundleFile>,
    pub total_bytes: u64,
    pub budget_bytes: u64,
}

impl BundleData {
    pub fn over_budget(&self) -> bool {
        self.total_bytes > self.budget_bytes
    }

    pub fn largest(&self) -> Option<&BundleFile> {
        self.files.first()
    }
}

/// Human-readable byte count, e.g. `1.5 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

fn collect_assets(root: &Path, output_dirs: &[String]) -> Vec<BundleFile> {
    let mut files = Vec::new();

    for dir in output_dirs {
        let out = root.join(dir);
        if !out.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&out) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("skipping unreadable entry under {}: {}", out.display(), e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let ext = entry.path().extension().and_then(|e| e.to_str()).unwrap_or("");
            if !BUNDLE_EXTENSIONS.contains(&ext) {
                continue;
            }
            // source maps end in .js.map, so they never match above
            match entry.metadata() {
                Ok(meta) => files.push(BundleFile {
                    path: relative_path(root, entry.path()).to_string_lossy().to_string(),
                    size_bytes: meta.len(),
                }),
                Err(e) => warn!("cannot stat {}: {}", entry.path().display(), e),
            }
        }
    }

    files.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes).then_with(|| a.path.cmp(&b.path)));
    files
}

pub struct BundleSizeAnalyzer;

#[async_trait::async_trait]
impl Analyzer for BundleSizeAnalyzer {
    fn name(&self) -> &'static str {
        BUNDLE_SIZE
    }

    fn supports(&self, kind: ProjectKind) -> bool {
        kind == ProjectKind::Application
    }

    async fn analyze(&self, ctx: &ScanContext) -> anyhow::Result<AnalyzerData> {
        let root = ctx.project_path().to_path_buf();
        let settings = ctx.config.bundle.clone();
        let output_dirs = settings.output_dirs.clone();

        let files = tokio::task::spawn_blocking(move || collect_assets(&root, &output_dirs)).await?;
        if files.is_empty() {
            bail!(
                "no build output found in {} (run the build first)",
                settings.output_dirs.join(", ")
            );
        }

        let total_bytes = files.iter().map(|f| f.size_bytes).sum();
        if ctx.debug() {
            debug!(
                "{}: {} assets, {}",
                ctx.project.name,
                files.len(),
                format_bytes(total_bytes)
            );
        }

        Ok(AnalyzerData::BundleSize(BundleData {
            files,
            total_bytes,
            budget_bytes: settings.budget_kb * 1024,
        }))
    }
}
