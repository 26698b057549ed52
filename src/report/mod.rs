//! Health reports built from analyzer results.
//!
//! - `profiles`: per-analyzer weight, thresholds, scoring and summaries
//! - `aggregate`: weighted project scores, recommendations, workspace health
//! - `render`: JSON, HTML and the terminal summary

mod aggregate;
mod profiles;
pub mod render;

pub use aggregate::{aggregate_project, aggregate_workspace, compute_trend, TREND_TOLERANCE};
pub use profiles::{clamp_score, AnalyzerConfig, AnalyzerConfigs, Thresholds};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::scan::FailedProject;
use crate::workspace::ProjectKind;

/// Bands applied to a project's overall score.
pub const OVERALL_THRESHOLDS: Thresholds = Thresholds {
    critical: 50.0,
    warning: 75.0,
};

/// Severity levels for issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "warning" => Ok(Severity::Warning),
            "info" => Ok(Severity::Info),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// A single finding in a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Issue {
    pub fn new(kind: &str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            severity,
            message: message.into(),
            file: None,
        }
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

/// Normalized view of one analyzer's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// 0-100, higher is healthier
    pub score: f64,
    pub issues: Vec<Issue>,
    pub metrics: BTreeMap<String, f64>,
}

impl Summary {
    pub fn critical_issues(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(|i| i.severity == Severity::Critical)
    }
}

/// Where a score falls relative to its thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Healthy,
    Caution,
    Failing,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Healthy => write!(f, "healthy"),
            Status::Caution => write!(f, "caution"),
            Status::Failing => write!(f, "failing"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
            Priority::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub priority: Priority,
    pub analyzer: String,
    pub message: String,
    /// Affected projects, for workspace-level recommendations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<String>,
}

/// An analyzer that ran but could not produce a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnavailableAnalyzer {
    pub analyzer: String,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectReport {
    pub project_name: String,
    pub kind: ProjectKind,
    pub overall_score: f64,
    /// Summaries keyed by analyzer name, in analyzer run order
    pub summaries: IndexMap<String, Summary>,
    pub recommendations: Vec<Recommendation>,
    #[serde(default)]
    pub unavailable: Vec<UnavailableAnalyzer>,
}

impl ProjectReport {
    pub fn status(&self) -> Status {
        OVERALL_THRESHOLDS.status(self.overall_score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Improving => write!(f, "improving"),
            Trend::Stable => write!(f, "stable"),
            Trend::Declining => write!(f, "declining"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateHealth {
    pub score: f64,
    pub trend: Trend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceReport {
    pub timestamp: DateTime<Utc>,
    pub project_reports: Vec<ProjectReport>,
    pub aggregate_health: AggregateHealth,
    /// Critical issue counts keyed by analyzer name
    pub critical_issues: BTreeMap<String, usize>,
    pub recommendations: Vec<Recommendation>,
    /// Set when the scan was cancelled before every project ran
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub failed_projects: Vec<FailedProject>,
}

impl WorkspaceReport {
    /// Load a report previously written as JSON.
    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Whether any project or analyzer score is below its critical threshold.
    pub fn has_failures(&self, configs: &AnalyzerConfigs) -> bool {
        self.project_reports.iter().any(|p| {
            p.status() == Status::Failing
                || p.summaries.iter().any(|(name, summary)| {
                    configs
                        .get(name)
                        .map(|c| c.thresholds.status(summary.score) == Status::Failing)
                        .unwrap_or(false)
                })
        })
    }
}
