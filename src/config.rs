//! Scan configuration for healthscan.
//!
//! A configuration file selects which analyzers run, which paths are ignored,
//! and how each analyzer's score is weighted and banded.

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file names searched for in the workspace root, in order.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["healthscan.yaml", ".healthscan.yaml", "healthscan.yml"];

/// Commented default configuration written by `healthscan init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = include_str!("templates/default.yaml");

/// Errors raised while loading or validating a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid exclude pattern {pattern:?}: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level scan configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScanConfig {
    /// Analyzer names to run, in order. Unknown names are skipped at scan time.
    #[serde(default = "default_enabled_analyzers")]
    pub enabled_analyzers: Vec<String>,
    /// Glob patterns matched against project-relative paths.
    #[serde(default = "default_exclude_paths")]
    pub exclude_paths: Vec<String>,
    #[serde(default)]
    pub thresholds: HashMap<String, ThresholdSetting>,
    #[serde(default)]
    pub weights: HashMap<String, f64>,
    #[serde(default)]
    pub duplication: DuplicationSettings,
    #[serde(default)]
    pub complexity: ComplexitySettings,
    #[serde(default)]
    pub dependency: DependencySettings,
    #[serde(default)]
    pub bundle: BundleSettings,
    #[serde(default)]
    pub workspace: WorkspaceLayout,
    /// Worker pool size for concurrent project scans (default: available cores)
    #[serde(default)]
    pub jobs: Option<usize>,
    /// Emit extra diagnostics from analyzers
    #[serde(default)]
    pub debug: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            enabled_analyzers: default_enabled_analyzers(),
            exclude_paths: default_exclude_paths(),
            thresholds: HashMap::new(),
            weights: HashMap::new(),
            duplication: DuplicationSettings::default(),
            complexity: ComplexitySettings::default(),
            dependency: DependencySettings::default(),
            bundle: BundleSettings::default(),
            workspace: WorkspaceLayout::default(),
            jobs: None,
            debug: false,
        }
    }
}

fn default_enabled_analyzers() -> Vec<String> {
    crate::analyzer::ANALYZER_NAMES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_exclude_paths() -> Vec<String> {
    vec!["**/*.min.js".to_string(), "**/*.d.ts".to_string()]
}

impl ScanConfig {
    /// Parse a configuration from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Look for a config file in `root`. Falls back to defaults when none exists.
    pub fn discover<P: AsRef<Path>>(root: P) -> Result<(Self, Option<PathBuf>), ConfigError> {
        for name in DEFAULT_CONFIG_NAMES {
            let candidate = root.as_ref().join(name);
            if candidate.is_file() {
                let config = Self::parse_file(&candidate)?;
                return Ok((config, Some(candidate)));
            }
        }
        Ok((Self::default(), None))
    }

    /// Worker pool size, never less than one.
    pub fn worker_count(&self) -> usize {
        self.jobs.filter(|n| *n > 0).unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Compile `exclude_paths` into a single matcher.
    pub fn exclude_matcher(&self) -> Result<ExcludeMatcher, ConfigError> {
        ExcludeMatcher::new(&self.exclude_paths)
    }
}

/// Threshold override for one analyzer.
///
/// A bare number replaces the warning threshold; the mapping form sets both bands.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ThresholdSetting {
    Warning(f64),
    Bands { critical: f64, warning: f64 },
}

/// Parameters for the duplicate detector.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DuplicationSettings {
    #[serde(default = "default_min_lines")]
    pub min_lines: usize,
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    /// Largest window (in lines past the start line) considered for a block
    #[serde(default = "default_max_window")]
    pub max_window: usize,
}

fn default_min_lines() -> usize {
    5
}

fn default_min_chars() -> usize {
    50
}

fn default_max_window() -> usize {
    50
}

impl Default for DuplicationSettings {
    fn default() -> Self {
        Self {
            min_lines: default_min_lines(),
            min_chars: default_min_chars(),
            max_window: default_max_window(),
        }
    }
}

/// Parameters for the complexity analyzer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComplexitySettings {
    /// Files above this estimated cyclomatic complexity are flagged (default: 20)
    #[serde(default = "default_max_file_complexity")]
    pub max_file_complexity: u32,
}

fn default_max_file_complexity() -> u32 {
    20
}

impl Default for ComplexitySettings {
    fn default() -> Self {
        Self {
            max_file_complexity: default_max_file_complexity(),
        }
    }
}

/// Parameters for the dependency analyzer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DependencySettings {
    /// Direct dependency count above which the score starts dropping (default: 50)
    #[serde(default = "default_max_dependencies")]
    pub max_dependencies: usize,
    /// External command printing a JSON object keyed by outdated package name,
    /// e.g. `["npm", "outdated", "--json"]`. Run in the project directory.
    #[serde(default)]
    pub outdated_command: Vec<String>,
}

fn default_max_dependencies() -> usize {
    50
}

impl Default for DependencySettings {
    fn default() -> Self {
        Self {
            max_dependencies: default_max_dependencies(),
            outdated_command: Vec::new(),
        }
    }
}

/// Parameters for the bundle-size analyzer.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BundleSettings {
    /// Build output directories, relative to the project root
    #[serde(default = "default_output_dirs")]
    pub output_dirs: Vec<String>,
    #[serde(default = "default_budget_kb")]
    pub budget_kb: u64,
}

fn default_output_dirs() -> Vec<String> {
    vec!["dist".to_string(), "build".to_string()]
}

fn default_budget_kb() -> u64 {
    500
}

impl Default for BundleSettings {
    fn default() -> Self {
        Self {
            output_dirs: default_output_dirs(),
            budget_kb: default_budget_kb(),
        }
    }
}

/// Directories whose children are treated as projects.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkspaceLayout {
    #[serde(default = "default_application_dirs")]
    pub applications: Vec<String>,
    #[serde(default = "default_library_dirs")]
    pub libraries: Vec<String>,
}

fn default_application_dirs() -> Vec<String> {
    vec!["apps".to_string()]
}

fn default_library_dirs() -> Vec<String> {
    vec!["libs".to_string(), "packages".to_string()]
}

impl Default for WorkspaceLayout {
    fn default() -> Self {
        Self {
            applications: default_application_dirs(),
            libraries: default_library_dirs(),
        }
    }
}

/// Compiled exclude globs.
#[derive(Debug, Clone)]
pub struct ExcludeMatcher {
    set: GlobSet,
    empty: bool,
}

impl ExcludeMatcher {
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|source| ConfigError::InvalidGlob {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|source| ConfigError::InvalidGlob {
            pattern: patterns.join(", "),
            source,
        })?;
        Ok(Self {
            set,
            empty: patterns.is_empty(),
        })
    }

    /// Check a path relative to the project root.
    pub fn is_excluded(&self, relative: &Path) -> bool {
        !self.empty && self.set.is_match(relative)
    }
}

impl Default for ExcludeMatcher {
    fn default() -> Self {
        Self {
            set: GlobSet::empty(),
            empty: true,
        }
    }
}

/// Validate a configuration for correctness.
pub fn validate(config: &ScanConfig) -> Result<(), ConfigError> {
    config.exclude_matcher()?;

    for (name, weight) in &config.weights {
        if !weight.is_finite() || *weight <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "weight for {:?} must be positive, got {}",
                name, weight
            )));
        }
    }

    for (name, setting) in &config.thresholds {
        let (critical, warning) = match *setting {
            ThresholdSetting::Warning(w) => (w, w),
            ThresholdSetting::Bands { critical, warning } => {
                if critical > warning {
                    return Err(ConfigError::Invalid(format!(
                        "threshold for {:?}: critical ({}) exceeds warning ({})",
                        name, critical, warning
                    )));
                }
                (critical, warning)
            }
        };
        if [critical, warning]
            .iter()
            .any(|v| !(0.0..=100.0).contains(v))
        {
            return Err(ConfigError::Invalid(format!(
                "threshold for {:?} must be within 0-100",
                name
            )));
        }
    }

    if config.duplication.min_lines == 0 {
        return Err(ConfigError::Invalid(
            "duplication.min_lines must be at least 1".to_string(),
        ));
    }
    if config.duplication.max_window < config.duplication.min_lines {
        return Err(ConfigError::Invalid(format!(
            "duplication.max_window ({}) is smaller than min_lines ({})",
            config.duplication.max_window, config.duplication.min_lines
        )));
    }

    Ok(())
}
