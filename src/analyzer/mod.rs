//! Analyzer plugin contract and registry.
//!
//! Every analyzer implements [`Analyzer`]. The provided [`Analyzer::run`]
//! method never fails: errors and panics raised by [`Analyzer::analyze`] are
//! captured into an unsuccessful [`AnalyzerResult`], so one broken analyzer
//! cannot take down a project scan.
//!
//! # Adding a New Analyzer
//!
//! Implement [`Analyzer`], add a payload variant to [`AnalyzerData`], register
//! the analyzer in [`AnalyzerRegistry::with_defaults`], and give it a profile
//! in `report::profiles`.

mod bundle;
mod complexity;
mod dependency;
mod duplication;
mod files;
pub mod syntax;
mod type_safety;

pub use bundle::{format_bytes, BundleData, BundleFile, BundleSizeAnalyzer};
pub use complexity::{
    estimate_complexity, file_complexity, ComplexityAnalyzer, ComplexityData, FileComplexity,
};
pub use dependency::{DependencyAnalyzer, DependencyData, DependencyEntry};
pub use duplication::{
    extract_blocks, fingerprint, fingerprint_with, normalize, normalize_with, resolve_overlaps,
    CodeBlock, DuplicateDetector, DuplicateMatch, DuplicationAnalyzer, DuplicationData,
    Fingerprint, LineRange, QuoteStyle, SourceFile,
};
pub use files::{collect_source_files, relative_path, SOURCE_EXTENSIONS};
pub use type_safety::{EscapeFinding, EscapeKind, TypeSafetyAnalyzer, TypeSafetyData};

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use crate::config::{ExcludeMatcher, ScanConfig};
use crate::workspace::{Project, ProjectKind, ProjectMetadata};

/// Registry names of the built-in analyzers, in default run order.
pub const DUPLICATION: &str = "duplication";
pub const COMPLEXITY: &str = "complexity";
pub const DEPENDENCY: &str = "dependency";
pub const BUNDLE_SIZE: &str = "bundle-size";
pub const TYPE_SAFETY: &str = "type-safety";

pub const ANALYZER_NAMES: &[&str] = &[DUPLICATION, COMPLEXITY, DEPENDENCY, BUNDLE_SIZE, TYPE_SAFETY];

/// Read-only inputs handed to every analyzer for one project.
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub project: Project,
    pub metadata: ProjectMetadata,
    pub config: Arc<ScanConfig>,
    pub excludes: Arc<ExcludeMatcher>,
}

impl ScanContext {
    /// Canonical project root.
    pub fn project_path(&self) -> &Path {
        &self.metadata.root
    }

    pub fn project_kind(&self) -> ProjectKind {
        self.project.kind
    }

    pub fn debug(&self) -> bool {
        self.config.debug
    }

    /// Source files under the project root, minus excluded paths.
    pub fn source_files(&self) -> Vec<std::path::PathBuf> {
        collect_source_files(self.project_path(), &self.excludes, SOURCE_EXTENSIONS)
    }
}

/// Analyzer-specific payload. One variant per analyzer kind, so summarizers
/// match on the concrete type instead of casting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AnalyzerData {
    Duplication(DuplicationData),
    Complexity(ComplexityData),
    Dependency(DependencyData),
    BundleSize(BundleData),
    TypeSafety(TypeSafetyData),
}

/// Outcome of running one analyzer against one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerResult {
    pub analyzer_name: String,
    pub success: bool,
    pub data: Option<AnalyzerData>,
    pub errors: Vec<String>,
}

impl AnalyzerResult {
    pub fn succeeded(name: &str, data: AnalyzerData) -> Self {
        Self {
            analyzer_name: name.to_string(),
            success: true,
            data: Some(data),
            errors: Vec::new(),
        }
    }

    pub fn failed(name: &str, errors: Vec<String>) -> Self {
        Self {
            analyzer_name: name.to_string(),
            success: false,
            data: None,
            errors,
        }
    }
}

/// A self-contained scan unit.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Unique registry key.
    fn name(&self) -> &'static str;

    /// Whether this analyzer applies to projects of `kind`.
    fn supports(&self, _kind: ProjectKind) -> bool {
        true
    }

    /// Produce this analyzer's payload. Errors are captured by [`Analyzer::run`].
    async fn analyze(&self, ctx: &ScanContext) -> anyhow::Result<AnalyzerData>;

    /// Run the analyzer, turning every failure into an unsuccessful result.
    async fn run(&self, ctx: &ScanContext) -> AnalyzerResult {
        let name = self.name();
        match AssertUnwindSafe(self.analyze(ctx)).catch_unwind().await {
            Ok(Ok(data)) => AnalyzerResult::succeeded(name, data),
            Ok(Err(e)) => {
                tracing::warn!("{} failed for {}: {:#}", name, ctx.project.name, e);
                AnalyzerResult::failed(name, vec![format!("{:#}", e)])
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "analyzer panicked".to_string());
                tracing::warn!("{} panicked for {}: {}", name, ctx.project.name, message);
                AnalyzerResult::failed(name, vec![format!("panic: {}", message)])
            }
        }
    }
}

/// Name-keyed analyzer table. Built once at startup, then shared read-only.
#[derive(Clone, Default)]
pub struct AnalyzerRegistry {
    analyzers: HashMap<&'static str, Arc<dyn Analyzer>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with all built-in analyzers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(DuplicationAnalyzer);
        registry.register(ComplexityAnalyzer);
        registry.register(DependencyAnalyzer);
        registry.register(BundleSizeAnalyzer);
        registry.register(TypeSafetyAnalyzer);
        registry
    }

    /// Add an analyzer, replacing any previous one with the same name.
    pub fn register<A: Analyzer + 'static>(&mut self, analyzer: A) {
        self.analyzers.insert(analyzer.name(), Arc::new(analyzer));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.analyzers.contains_key(name)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::workspace::ManifestKind;

    /// Context for a project rooted at `root` with default configuration.
    pub fn context_for(root: &Path, kind: ProjectKind) -> ScanContext {
        context_with_config(root, kind, ScanConfig::default())
    }

    pub fn context_with_config(root: &Path, kind: ProjectKind, config: ScanConfig) -> ScanContext {
        let excludes = config.exclude_matcher().unwrap();
        ScanContext {
            project: Project::new("fixture", kind, root),
            metadata: ProjectMetadata {
                root: root.to_path_buf(),
                manifest: root.join("package.json"),
                manifest_kind: ManifestKind::PackageJson,
                package_name: None,
                version: None,
            },
            config: Arc::new(config),
            excludes: Arc::new(excludes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::context_for;
    use super::*;
    use tempfile::TempDir;

    struct Failing;

    #[async_trait]
    impl Analyzer for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn analyze(&self, _ctx: &ScanContext) -> anyhow::Result<AnalyzerData> {
            anyhow::bail!("tool exited with status 2")
        }
    }

    struct Panicking;

    #[async_trait]
    impl Analyzer for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn analyze(&self, _ctx: &ScanContext) -> anyhow::Result<AnalyzerData> {
            panic!("index out of bounds")
        }
    }

    #[tokio::test]
    async fn test_run_captures_errors() {
        let temp = TempDir::new().unwrap();
        let ctx = context_for(temp.path(), ProjectKind::Library);

        let result = Failing.run(&ctx).await;
        assert!(!result.success);
        assert!(result.data.is_none());
        assert_eq!(result.analyzer_name, "failing");
        assert!(result.errors[0].contains("status 2"));
    }

    #[tokio::test]
    async fn test_run_captures_panics() {
        let temp = TempDir::new().unwrap();
        let ctx = context_for(temp.path(), ProjectKind::Library);

        let result = Panicking.run(&ctx).await;
        assert!(!result.success);
        assert!(result.errors[0].contains("index out of bounds"));
    }

    #[test]
    fn test_default_registry() {
        let registry = AnalyzerRegistry::with_defaults();
        for name in ANALYZER_NAMES {
            assert!(registry.contains(name), "missing {}", name);
        }
        assert!(registry.get("lint").is_none());
    }
}
