//! Project and workspace aggregation.

use chrono::Utc;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::scan::{ProjectScan, ScanOutcome};

use super::{
    clamp_score, AggregateHealth, AnalyzerConfigs, Priority, ProjectReport, Recommendation,
    Trend, UnavailableAnalyzer, WorkspaceReport,
};

/// Score movement, in points, still reported as stable.
pub const TREND_TOLERANCE: f64 = 2.0;

/// Build one project's report from its analyzer results.
///
/// Only successful results with a registered profile contribute, and their
/// weights are renormalized over that subset. With no contributors the
/// overall score is 0.
pub fn aggregate_project(scan: &ProjectScan, configs: &AnalyzerConfigs) -> ProjectReport {
    let mut summaries = IndexMap::new();
    let mut recommendations = Vec::new();
    let mut unavailable = Vec::new();
    let mut total_score = 0.0;
    let mut total_weight = 0.0;

    for result in &scan.results {
        let data = match (&result.data, result.success) {
            (Some(data), true) => data,
            _ => {
                unavailable.push(UnavailableAnalyzer {
                    analyzer: result.analyzer_name.clone(),
                    errors: result.errors.clone(),
                });
                continue;
            }
        };

        let Some(config) = configs.get(&result.analyzer_name) else {
            debug!("no profile for {}, ignoring its result", result.analyzer_name);
            continue;
        };
        let Some(summary) = config.summarize(data) else {
            warn!(
                "{} returned a payload its profile cannot read, ignoring",
                result.analyzer_name
            );
            continue;
        };

        total_score += summary.score * config.weight;
        total_weight += config.weight;

        if summary.score < config.thresholds.critical {
            recommendations.push(Recommendation {
                priority: Priority::High,
                analyzer: config.name.clone(),
                message: format!(
                    "{} score {:.0} is below the critical threshold of {:.0}",
                    config.name, summary.score, config.thresholds.critical
                ),
                projects: Vec::new(),
            });
        } else if summary.score < config.thresholds.warning {
            recommendations.push(Recommendation {
                priority: Priority::Medium,
                analyzer: config.name.clone(),
                message: format!(
                    "{} score {:.0} is below the warning threshold of {:.0}",
                    config.name, summary.score, config.thresholds.warning
                ),
                projects: Vec::new(),
            });
        }

        for issue in summary.critical_issues() {
            let message = match &issue.file {
                Some(file) => format!("{}: {}", file, issue.message),
                None => issue.message.clone(),
            };
            recommendations.push(Recommendation {
                priority: Priority::High,
                analyzer: config.name.clone(),
                message,
                projects: Vec::new(),
            });
        }

        summaries.insert(result.analyzer_name.clone(), summary);
    }

    let overall_score = if total_weight > 0.0 {
        clamp_score(total_score / total_weight)
    } else {
        0.0
    };
    // stable sort keeps analyzer order within a priority
    recommendations.sort_by_key(|r| r.priority);

    ProjectReport {
        project_name: scan.project.name.clone(),
        kind: scan.project.kind,
        overall_score,
        summaries,
        recommendations,
        unavailable,
    }
}

/// Compare against a previous aggregate score.
pub fn compute_trend(current: f64, previous: Option<f64>) -> Trend {
    match previous {
        Some(prev) if current - prev > TREND_TOLERANCE => Trend::Improving,
        Some(prev) if prev - current > TREND_TOLERANCE => Trend::Declining,
        _ => Trend::Stable,
    }
}

/// Build the workspace report for a completed (or cancelled) scan.
pub fn aggregate_workspace(
    outcome: &ScanOutcome,
    configs: &AnalyzerConfigs,
    previous: Option<&WorkspaceReport>,
) -> WorkspaceReport {
    let project_reports: Vec<ProjectReport> = outcome
        .projects
        .values()
        .map(|scan| aggregate_project(scan, configs))
        .collect();

    let mut critical_issues: BTreeMap<String, usize> = BTreeMap::new();
    for report in &project_reports {
        for (name, summary) in &report.summaries {
            *critical_issues.entry(name.clone()).or_insert(0) += summary.critical_issues().count();
        }
    }

    let total = project_reports.len();
    let mut recommendations = Vec::new();
    for config in configs.iter() {
        let affected: Vec<String> = project_reports
            .iter()
            .filter(|r| {
                r.summaries
                    .get(&config.name)
                    .map(|s| s.score < config.thresholds.warning)
                    .unwrap_or(false)
            })
            .map(|r| r.project_name.clone())
            .collect();

        if !affected.is_empty() && affected.len() * 3 > total {
            recommendations.push(Recommendation {
                priority: Priority::High,
                analyzer: config.name.clone(),
                message: format!(
                    "widespread {} issue: {} of {} projects are below the warning threshold",
                    config.name,
                    affected.len(),
                    total
                ),
                projects: affected,
            });
        }
    }

    let score = if total == 0 {
        0.0
    } else {
        project_reports.iter().map(|r| r.overall_score).sum::<f64>() / total as f64
    };
    let trend = compute_trend(score, previous.map(|p| p.aggregate_health.score));

    WorkspaceReport {
        timestamp: Utc::now(),
        project_reports,
        aggregate_health: AggregateHealth { score, trend },
        critical_issues,
        recommendations,
        partial: outcome.partial,
        failed_projects: outcome.failed.clone(),
    }
}
