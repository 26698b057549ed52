//! Per-analyzer scoring profiles.
//!
//! A profile turns one analyzer's typed payload into a score and a
//! [`Summary`]. Profiles are built once per report run from the defaults
//! plus any weight and threshold overrides in the configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analyzer::{
    format_bytes, AnalyzerData, BundleData, ComplexityData, DependencyData, DuplicationData,
    EscapeKind, TypeSafetyData, BUNDLE_SIZE, COMPLEXITY, DEPENDENCY, DUPLICATION, TYPE_SAFETY,
};
use crate::config::{ScanConfig, ThresholdSetting};

use super::{Issue, Severity, Status, Summary};

/// Duplicate blocks at least this long are critical.
const LARGE_DUPLICATE_LINES: usize = 50;

/// Clamp a score into [0, 100]. NaN becomes 0.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub critical: f64,
    pub warning: f64,
}

impl Thresholds {
    pub const fn new(critical: f64, warning: f64) -> Self {
        Self { critical, warning }
    }

    pub fn status(&self, score: f64) -> Status {
        if score < self.critical {
            Status::Failing
        } else if score < self.warning {
            Status::Caution
        } else {
            Status::Healthy
        }
    }

    fn apply(&mut self, setting: ThresholdSetting) {
        match setting {
            ThresholdSetting::Warning(w) => {
                self.warning = w;
                self.critical = self.critical.min(w);
            }
            ThresholdSetting::Bands { critical, warning } => {
                self.critical = critical;
                self.warning = warning;
            }
        }
    }
}

pub type ScoreFn = fn(&AnalyzerData) -> Option<f64>;
pub type SummarizeFn = fn(&AnalyzerData) -> Option<Summary>;

/// How one analyzer's results are weighted, banded and summarized.
///
/// `scoring` and `summarize` return `None` when handed another analyzer's
/// payload.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub name: String,
    pub weight: f64,
    pub thresholds: Thresholds,
    scoring: ScoreFn,
    summarize: SummarizeFn,
}

impl AnalyzerConfig {
    pub fn new(
        name: impl Into<String>,
        weight: f64,
        thresholds: Thresholds,
        scoring: ScoreFn,
        summarize: SummarizeFn,
    ) -> Self {
        Self {
            name: name.into(),
            weight,
            thresholds,
            scoring,
            summarize,
        }
    }

    pub fn score(&self, data: &AnalyzerData) -> Option<f64> {
        (self.scoring)(data).map(clamp_score)
    }

    pub fn summarize(&self, data: &AnalyzerData) -> Option<Summary> {
        (self.summarize)(data).map(|mut summary| {
            summary.score = clamp_score(summary.score);
            summary
        })
    }
}

/// Immutable set of analyzer profiles, in registration order.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerConfigs {
    configs: Vec<AnalyzerConfig>,
}

impl AnalyzerConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in profiles for every default analyzer.
    pub fn defaults() -> Self {
        let mut configs = Self::new();
        configs.register(AnalyzerConfig::new(
            DUPLICATION,
            0.25,
            Thresholds::new(60.0, 80.0),
            |d| match d {
                AnalyzerData::Duplication(d) => Some(duplication_score(d)),
                _ => None,
            },
            |d| match d {
                AnalyzerData::Duplication(d) => Some(summarize_duplication(d)),
                _ => None,
            },
        ));
        configs.register(AnalyzerConfig::new(
            COMPLEXITY,
            0.25,
            Thresholds::new(50.0, 75.0),
            |d| match d {
                AnalyzerData::Complexity(d) => Some(complexity_score(d)),
                _ => None,
            },
            |d| match d {
                AnalyzerData::Complexity(d) => Some(summarize_complexity(d)),
                _ => None,
            },
        ));
        configs.register(AnalyzerConfig::new(
            DEPENDENCY,
            0.20,
            Thresholds::new(50.0, 75.0),
            |d| match d {
                AnalyzerData::Dependency(d) => Some(dependency_score(d)),
                _ => None,
            },
            |d| match d {
                AnalyzerData::Dependency(d) => Some(summarize_dependencies(d)),
                _ => None,
            },
        ));
        configs.register(AnalyzerConfig::new(
            BUNDLE_SIZE,
            0.10,
            Thresholds::new(50.0, 80.0),
            |d| match d {
                AnalyzerData::BundleSize(d) => Some(bundle_score(d)),
                _ => None,
            },
            |d| match d {
                AnalyzerData::BundleSize(d) => Some(summarize_bundle(d)),
                _ => None,
            },
        ));
        configs.register(AnalyzerConfig::new(
            TYPE_SAFETY,
            0.20,
            Thresholds::new(50.0, 75.0),
            |d| match d {
                AnalyzerData::TypeSafety(d) => Some(type_safety_score(d)),
                _ => None,
            },
            |d| match d {
                AnalyzerData::TypeSafety(d) => Some(summarize_type_safety(d)),
                _ => None,
            },
        ));
        configs
    }

    /// Defaults with the configuration's weight and threshold overrides.
    /// Overrides for unknown analyzers are ignored.
    pub fn from_config(config: &ScanConfig) -> Self {
        let mut configs = Self::defaults();
        for profile in &mut configs.configs {
            if let Some(weight) = config.weights.get(&profile.name) {
                profile.weight = *weight;
            }
            if let Some(setting) = config.thresholds.get(&profile.name) {
                profile.thresholds.apply(*setting);
            }
        }
        configs
    }

    /// Add a profile, replacing any previous one with the same name.
    pub fn register(&mut self, config: AnalyzerConfig) {
        match self.configs.iter_mut().find(|c| c.name == config.name) {
            Some(existing) => *existing = config,
            None => self.configs.push(config),
        }
    }

    pub fn get(&self, name: &str) -> Option<&AnalyzerConfig> {
        self.configs.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnalyzerConfig> {
        self.configs.iter()
    }
}

fn metrics<const N: usize>(pairs: [(&str, f64); N]) -> BTreeMap<String, f64> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn duplication_score(data: &DuplicationData) -> f64 {
    if data.matches.is_empty() || data.total_lines == 0 {
        return 100.0;
    }
    100.0 - 2.0 * data.duplication_percentage()
}

fn summarize_duplication(data: &DuplicationData) -> Summary {
    let mut issues: Vec<Issue> = data
        .matches
        .iter()
        .map(|m| {
            let severity = if m.line_count >= LARGE_DUPLICATE_LINES {
                Severity::Critical
            } else {
                Severity::Warning
            };
            Issue::new(
                "duplicate-block",
                severity,
                format!(
                    "{} lines duplicated between {}:{} and {}:{}",
                    m.line_count, m.file_a, m.line_range_a, m.file_b, m.line_range_b
                ),
            )
            .in_file(m.file_a.clone())
        })
        .collect();
    issues.extend(unreadable_issues(&data.skipped_files));

    Summary {
        score: duplication_score(data),
        issues,
        metrics: metrics([
            ("duplicatedLines", data.duplicated_lines as f64),
            ("totalLines", data.total_lines as f64),
            ("duplicationPercentage", data.duplication_percentage()),
            ("filesScanned", data.files_scanned as f64),
            ("matchCount", data.matches.len() as f64),
        ]),
    }
}

fn complexity_score(data: &ComplexityData) -> f64 {
    let total = data.files.len();
    if total == 0 {
        return 100.0;
    }
    let limit = data.max_file_complexity;
    let within = data.files.iter().filter(|f| f.complexity <= limit).count();
    let critical = data
        .files
        .iter()
        .filter(|f| f.complexity > limit.saturating_mul(2))
        .count();
    100.0 * within as f64 / total as f64 - 2.0 * critical as f64
}

fn summarize_complexity(data: &ComplexityData) -> Summary {
    let limit = data.max_file_complexity;
    let mut issues: Vec<Issue> = data
        .over_limit()
        .map(|f| {
            let severity = if f.complexity > limit.saturating_mul(2) {
                Severity::Critical
            } else {
                Severity::Warning
            };
            Issue::new(
                "high-complexity",
                severity,
                format!("complexity {} exceeds the limit of {}", f.complexity, limit),
            )
            .in_file(f.path.clone())
        })
        .collect();
    issues.extend(unreadable_issues(&data.skipped_files));

    Summary {
        score: complexity_score(data),
        issues,
        metrics: metrics([
            ("filesAnalyzed", data.files_analyzed() as f64),
            ("averageComplexity", data.average_complexity()),
            ("maxComplexity", data.max_complexity() as f64),
            ("filesOverLimit", data.over_limit().count() as f64),
        ]),
    }
}

fn excess_dependencies(data: &DependencyData) -> usize {
    data.direct_count().saturating_sub(data.max_dependencies)
}

fn dependency_score(data: &DependencyData) -> f64 {
    100.0
        - 10.0 * data.unpinned().count() as f64
        - 5.0 * data.outdated.len() as f64
        - excess_dependencies(data) as f64
}

fn summarize_dependencies(data: &DependencyData) -> Summary {
    let mut issues: Vec<Issue> = data
        .unpinned()
        .map(|d| {
            let severity = if d.dev {
                Severity::Warning
            } else {
                Severity::Critical
            };
            let requirement = if d.version.is_empty() {
                "no version"
            } else {
                d.version.as_str()
            };
            Issue::new(
                "unpinned-dependency",
                severity,
                format!("{} accepts any version ({})", d.name, requirement),
            )
            .in_file(data.manifest.clone())
        })
        .collect();

    issues.extend(data.outdated.iter().map(|name| {
        Issue::new(
            "outdated-dependency",
            Severity::Info,
            format!("{} has a newer release", name),
        )
    }));

    let excess = excess_dependencies(data);
    if excess > 0 {
        issues.push(
            Issue::new(
                "too-many-dependencies",
                Severity::Warning,
                format!(
                    "{} direct dependencies, {} over the limit of {}",
                    data.direct_count(),
                    excess,
                    data.max_dependencies
                ),
            )
            .in_file(data.manifest.clone()),
        );
    }

    let mut summary_metrics = metrics([
        ("dependencies", data.direct_count() as f64),
        ("devDependencies", data.dev_count() as f64),
        ("unpinned", data.unpinned().count() as f64),
    ]);
    if data.outdated_checked {
        summary_metrics.insert("outdated".to_string(), data.outdated.len() as f64);
    }

    Summary {
        score: dependency_score(data),
        issues,
        metrics: summary_metrics,
    }
}

fn bundle_score(data: &BundleData) -> f64 {
    if data.total_bytes <= data.budget_bytes {
        100.0
    } else {
        100.0 * data.budget_bytes as f64 / data.total_bytes as f64
    }
}

fn summarize_bundle(data: &BundleData) -> Summary {
    let mut issues = Vec::new();
    if data.over_budget() {
        let severity = if data.total_bytes > data.budget_bytes.saturating_mul(2) {
            Severity::Critical
        } else {
            Severity::Warning
        };
        issues.push(Issue::new(
            "over-budget",
            severity,
            format!(
                "build output is {} against a budget of {}",
                format_bytes(data.total_bytes),
                format_bytes(data.budget_bytes)
            ),
        ));
    }
    if let Some(largest) = data.largest() {
        issues.push(
            Issue::new(
                "largest-asset",
                Severity::Info,
                format!("largest asset is {}", format_bytes(largest.size_bytes)),
            )
            .in_file(largest.path.clone()),
        );
    }

    Summary {
        score: bundle_score(data),
        issues,
        metrics: metrics([
            ("totalBytes", data.total_bytes as f64),
            ("budgetBytes", data.budget_bytes as f64),
            ("assets", data.files.len() as f64),
            (
                "largestAssetBytes",
                data.largest().map(|f| f.size_bytes).unwrap_or(0) as f64,
            ),
        ]),
    }
}

fn type_safety_score(data: &TypeSafetyData) -> f64 {
    100.0 - 10.0 * data.escapes_per_kloc()
}

fn summarize_type_safety(data: &TypeSafetyData) -> Summary {
    let mut issues: Vec<Issue> = data
        .findings
        .iter()
        .filter(|f| f.kind == EscapeKind::NoCheck)
        .map(|f| {
            Issue::new(
                EscapeKind::NoCheck.as_str(),
                Severity::Critical,
                "type checking is disabled for the whole file",
            )
            .in_file(f.path.clone())
        })
        .collect();

    let mut summary_metrics = metrics([
        ("escapes", data.findings.len() as f64),
        ("escapesPerKloc", data.escapes_per_kloc()),
        ("filesScanned", data.files_scanned as f64),
        ("totalLines", data.total_lines as f64),
    ]);

    for kind in EscapeKind::ALL {
        let count = data.count(kind);
        summary_metrics.insert(kind.as_str().to_string(), count as f64);
        if count == 0 || kind == EscapeKind::NoCheck {
            continue;
        }
        let severity = if kind == EscapeKind::Unsafe {
            Severity::Info
        } else {
            Severity::Warning
        };
        issues.push(Issue::new(
            kind.as_str(),
            severity,
            format!("{} {} occurrences", count, kind),
        ));
    }
    issues.extend(unreadable_issues(&data.skipped_files));

    Summary {
        score: type_safety_score(data),
        issues,
        metrics: summary_metrics,
    }
}

fn unreadable_issues(skipped: &[String]) -> impl Iterator<Item = Issue> + '_ {
    skipped.iter().map(|path| {
        Issue::new("unreadable-file", Severity::Info, "file could not be read").in_file(path.clone())
    })
}
