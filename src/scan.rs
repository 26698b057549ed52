//! Scan orchestration across workspace projects.
//!
//! Projects are scanned concurrently through a bounded pool. Within a
//! project every enabled analyzer runs concurrently and writes only its own
//! result slot. A project that cannot be resolved is recorded as failed and
//! the rest of the workspace carries on.

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::analyzer::{Analyzer, AnalyzerRegistry, AnalyzerResult, ScanContext};
use crate::config::{ConfigError, ExcludeMatcher, ScanConfig};
use crate::workspace::{resolve_project, Project, ProjectError};

/// Cooperative cancellation shared between the scanner and its caller.
///
/// Projects that have not started when the token fires are skipped.
/// Projects already in flight run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Analyzer results for one project, in configured analyzer order.
#[derive(Debug, Clone)]
pub struct ProjectScan {
    pub project: Project,
    pub results: Vec<AnalyzerResult>,
}

/// A project that could not be scanned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedProject {
    pub name: String,
    pub error: String,
}

/// Everything a workspace scan produced.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    /// Completed projects keyed by name
    pub projects: BTreeMap<String, ProjectScan>,
    pub failed: Vec<FailedProject>,
    /// Set when cancellation skipped at least one project
    pub partial: bool,
}

enum ProjectOutcome {
    Done(ProjectScan),
    Failed(FailedProject),
    Skipped(String),
}

/// Runs the enabled analyzers over workspace projects.
pub struct Scanner {
    registry: Arc<AnalyzerRegistry>,
    config: Arc<ScanConfig>,
    excludes: Arc<ExcludeMatcher>,
    cancel: CancelToken,
    progress: ProgressBar,
}

impl Scanner {
    /// Create a scanner. Fails only when the exclude globs do not compile.
    pub fn new(registry: AnalyzerRegistry, config: ScanConfig) -> Result<Self, ConfigError> {
        let excludes = config.exclude_matcher()?;
        Ok(Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
            excludes: Arc::new(excludes),
            cancel: CancelToken::new(),
            progress: ProgressBar::hidden(),
        })
    }

    /// Report per-project completion on `progress`.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Scan all `projects` with at most `config.worker_count()` in flight.
    pub async fn scan(&self, projects: Vec<Project>) -> ScanOutcome {
        let jobs = self.config.worker_count();
        debug!("scanning {} projects with {} workers", projects.len(), jobs);
        self.progress.set_length(projects.len() as u64);

        let outcomes: Vec<ProjectOutcome> = stream::iter(projects)
            .map(|project| async move {
                if self.cancel.is_cancelled() {
                    return ProjectOutcome::Skipped(project.name);
                }
                self.progress.set_message(project.name.clone());
                let outcome = match self.scan_project(&project).await {
                    Ok(scan) => ProjectOutcome::Done(scan),
                    Err(e) => {
                        warn!("skipping project {}: {}", project.name, e);
                        ProjectOutcome::Failed(FailedProject {
                            name: project.name.clone(),
                            error: e.to_string(),
                        })
                    }
                };
                self.progress.inc(1);
                outcome
            })
            .buffer_unordered(jobs)
            .collect()
            .await;

        let mut result = ScanOutcome::default();
        let mut skipped = 0;
        for outcome in outcomes {
            match outcome {
                ProjectOutcome::Done(scan) => {
                    result.projects.insert(scan.project.name.clone(), scan);
                }
                ProjectOutcome::Failed(failed) => result.failed.push(failed),
                ProjectOutcome::Skipped(name) => {
                    debug!("cancelled before scanning {}", name);
                    skipped += 1;
                }
            }
        }
        result.failed.sort_by(|a, b| a.name.cmp(&b.name));

        if skipped > 0 {
            info!("scan cancelled, {} projects not scanned", skipped);
            result.partial = true;
        }
        self.progress.finish_and_clear();
        result
    }

    /// Resolve one project and run every applicable enabled analyzer on it.
    pub async fn scan_project(&self, project: &Project) -> Result<ProjectScan, ProjectError> {
        let metadata = resolve_project(project)?;
        let ctx = ScanContext {
            project: project.clone(),
            metadata,
            config: Arc::clone(&self.config),
            excludes: Arc::clone(&self.excludes),
        };

        let analyzers = self.enabled_analyzers(project);
        let results = join_all(analyzers.iter().map(|a| a.run(&ctx))).await;

        if self.config.debug {
            let failed = results.iter().filter(|r| !r.success).count();
            debug!(
                "{}: {} analyzers ran, {} failed",
                project.name,
                results.len(),
                failed
            );
        }

        Ok(ProjectScan {
            project: project.clone(),
            results,
        })
    }

    fn enabled_analyzers(&self, project: &Project) -> Vec<Arc<dyn Analyzer>> {
        self.config
            .enabled_analyzers
            .iter()
            .filter_map(|name| {
                let analyzer = self.registry.get(name);
                if analyzer.is_none() {
                    debug!("analyzer {:?} is not registered, skipping", name);
                }
                analyzer
            })
            .filter(|a| {
                let applies = a.supports(project.kind);
                if !applies {
                    debug!("{} does not apply to {} {}", a.name(), project.kind, project.name);
                }
                applies
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnalyzerData, ComplexityData, BUNDLE_SIZE, COMPLEXITY, DUPLICATION};
    use crate::workspace::ProjectKind;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn make_project(root: &Path, rel: &str) -> std::path::PathBuf {
        let dir = root.join(rel);
        fs::create_dir_all(dir.join("src")).unwrap();
        fs::write(dir.join("package.json"), r#"{"name": "fixture"}"#).unwrap();
        fs::write(dir.join("src/index.ts"), "export const ready = true;\n").unwrap();
        dir
    }

    fn config_with(analyzers: &[&str]) -> ScanConfig {
        ScanConfig {
            enabled_analyzers: analyzers.iter().map(|s| s.to_string()).collect(),
            jobs: Some(2),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_scan_preserves_analyzer_order_and_skips_unknown() {
        let temp = TempDir::new().unwrap();
        let dir = make_project(temp.path(), "apps/web");

        let scanner = Scanner::new(
            AnalyzerRegistry::with_defaults(),
            config_with(&[COMPLEXITY, "lint", DUPLICATION]),
        )
        .unwrap();
        let outcome = scanner
            .scan(vec![Project::new("web", ProjectKind::Application, dir)])
            .await;

        let scan = &outcome.projects["web"];
        let names: Vec<_> = scan.results.iter().map(|r| r.analyzer_name.as_str()).collect();
        assert_eq!(names, vec![COMPLEXITY, DUPLICATION]);
        assert!(!outcome.partial);
    }

    #[tokio::test]
    async fn test_unresolvable_project_does_not_abort_scan() {
        let temp = TempDir::new().unwrap();
        let good = make_project(temp.path(), "libs/ui");
        let no_manifest = temp.path().join("libs/empty");
        fs::create_dir_all(&no_manifest).unwrap();

        let scanner =
            Scanner::new(AnalyzerRegistry::with_defaults(), config_with(&[COMPLEXITY])).unwrap();
        let outcome = scanner
            .scan(vec![
                Project::new("ui", ProjectKind::Library, good),
                Project::new("empty", ProjectKind::Library, no_manifest),
                Project::new("ghost", ProjectKind::Library, temp.path().join("libs/ghost")),
            ])
            .await;

        assert_eq!(outcome.projects.len(), 1);
        assert!(outcome.projects.contains_key("ui"));
        let failed: Vec<_> = outcome.failed.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(failed, vec!["empty", "ghost"]);
        assert!(outcome.failed[0].error.contains("manifest"));
    }

    #[tokio::test]
    async fn test_inapplicable_analyzer_produces_no_result() {
        let temp = TempDir::new().unwrap();
        let dir = make_project(temp.path(), "libs/core");

        let scanner = Scanner::new(
            AnalyzerRegistry::with_defaults(),
            config_with(&[BUNDLE_SIZE, COMPLEXITY]),
        )
        .unwrap();
        let outcome = scanner
            .scan(vec![Project::new("core", ProjectKind::Library, dir)])
            .await;

        let names: Vec<_> = outcome.projects["core"]
            .results
            .iter()
            .map(|r| r.analyzer_name.as_str())
            .collect();
        assert_eq!(names, vec![COMPLEXITY]);
    }

    #[tokio::test]
    async fn test_cancelled_scan_is_partial() {
        let temp = TempDir::new().unwrap();
        let a = make_project(temp.path(), "apps/a");
        let b = make_project(temp.path(), "apps/b");

        let cancel = CancelToken::new();
        cancel.cancel();
        let scanner = Scanner::new(AnalyzerRegistry::with_defaults(), config_with(&[COMPLEXITY]))
            .unwrap()
            .with_cancel_token(cancel);
        let outcome = scanner
            .scan(vec![
                Project::new("a", ProjectKind::Application, a),
                Project::new("b", ProjectKind::Application, b),
            ])
            .await;

        assert!(outcome.partial);
        assert!(outcome.projects.is_empty());
        assert!(outcome.failed.is_empty());
    }

    /// Cancels the scan from inside its first project.
    struct CancelsScan(CancelToken);

    #[async_trait::async_trait]
    impl Analyzer for CancelsScan {
        fn name(&self) -> &'static str {
            "cancels-scan"
        }

        async fn analyze(&self, _ctx: &ScanContext) -> anyhow::Result<AnalyzerData> {
            self.0.cancel();
            Ok(AnalyzerData::Complexity(ComplexityData::default()))
        }
    }

    #[tokio::test]
    async fn test_cancel_mid_scan_keeps_completed_projects() {
        let temp = TempDir::new().unwrap();
        let first = make_project(temp.path(), "apps/first");
        let second = make_project(temp.path(), "apps/second");

        let cancel = CancelToken::new();
        let mut registry = AnalyzerRegistry::new();
        registry.register(CancelsScan(cancel.clone()));
        let config = ScanConfig {
            jobs: Some(1),
            ..config_with(&["cancels-scan"])
        };
        let scanner = Scanner::new(registry, config).unwrap().with_cancel_token(cancel);

        let outcome = scanner
            .scan(vec![
                Project::new("first", ProjectKind::Application, first),
                Project::new("second", ProjectKind::Application, second),
            ])
            .await;

        assert!(outcome.partial);
        let scanned: Vec<_> = outcome.projects.keys().map(String::as_str).collect();
        assert_eq!(scanned, vec!["first"]);
        let results = &outcome.projects["first"].results;
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert!(outcome.failed.is_empty());
    }

    #[test]
    fn test_invalid_exclude_glob_rejected() {
        let config = ScanConfig {
            exclude_paths: vec!["[".to_string()],
            ..Default::default()
        };
        assert!(Scanner::new(AnalyzerRegistry::new(), config).is_err());
    }
}
