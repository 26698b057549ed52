//! Output formatting for workspace reports.
//!
//! - JSON: the report shape, camelCase field names
//! - HTML: a standalone page for sharing
//! - Summary: colored terminal lines, one per project and analyzer

use colored::*;
use std::io::Write;

use super::{
    AnalyzerConfigs, Priority, ProjectReport, Status, WorkspaceReport, OVERALL_THRESHOLDS,
};

/// Write the report as pretty-printed JSON.
pub fn write_json<W: Write>(report: &WorkspaceReport, mut out: W) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut out, report)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}

/// Write the terminal summary.
///
/// Analyzers without a profile are shown without a status. Analyzers that
/// could not run are listed as unavailable.
pub fn write_summary<W: Write>(
    report: &WorkspaceReport,
    configs: &AnalyzerConfigs,
    mut out: W,
) -> std::io::Result<()> {
    writeln!(out)?;
    if report.project_reports.is_empty() {
        writeln!(out, "  {}", "No projects were scanned.".dimmed())?;
    }

    for project in &report.project_reports {
        write_project(&mut out, project, configs)?;
    }

    for failed in &report.failed_projects {
        writeln!(
            out,
            "  {} {}  {}",
            "✗".red(),
            failed.name.bold(),
            failed.error.dimmed()
        )?;
    }

    let recommendations: Vec<_> = report
        .recommendations
        .iter()
        .chain(report.project_reports.iter().flat_map(|p| &p.recommendations))
        .filter(|r| r.priority == Priority::High)
        .collect();
    if !recommendations.is_empty() {
        writeln!(out)?;
        writeln!(out, "  {} ({}):", "Recommendations".bold(), recommendations.len())?;
        for r in recommendations {
            writeln!(out, "    {} {}", "•".red(), r.message)?;
        }
    }

    writeln!(out)?;
    write!(out, "  Workspace health: ")?;
    write_score(&mut out, report.aggregate_health.score, OVERALL_THRESHOLDS.status(report.aggregate_health.score))?;
    write!(out, "  {}", format!("trend: {}", report.aggregate_health.trend).dimmed())?;
    if report.partial {
        write!(out, "  {}", "PARTIAL (scan cancelled)".yellow())?;
    }
    writeln!(out)?;
    Ok(())
}

fn write_project<W: Write>(
    out: &mut W,
    project: &ProjectReport,
    configs: &AnalyzerConfigs,
) -> std::io::Result<()> {
    write!(
        out,
        "  {} {}  ",
        project.project_name.bold(),
        format!("({})", project.kind).dimmed()
    )?;
    write_score(out, project.overall_score, project.status())?;
    writeln!(out)?;

    for (name, summary) in &project.summaries {
        write!(out, "    {:<14}", name)?;
        match configs.get(name) {
            Some(config) => {
                write_score(out, summary.score, config.thresholds.status(summary.score))?
            }
            None => write!(out, "{:>5.1}", summary.score)?,
        }
        writeln!(out)?;
    }

    for unavailable in &project.unavailable {
        writeln!(
            out,
            "    {:<14}{}  {}",
            unavailable.analyzer,
            "unavailable".dimmed(),
            unavailable.errors.join("; ").dimmed()
        )?;
    }
    writeln!(out)?;
    Ok(())
}

fn write_score<W: Write>(out: &mut W, score: f64, status: Status) -> std::io::Result<()> {
    let text = format!("{:>5.1}", score);
    match status {
        Status::Healthy => write!(out, "{}  {}", text.green(), "healthy".green()),
        Status::Caution => write!(out, "{}  {}", text.yellow(), "caution".yellow()),
        Status::Failing => write!(out, "{}  {}", text.red().bold(), "failing".red().bold()),
    }
}

fn escape_html(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem;color:#222}\
table{border-collapse:collapse;margin-bottom:1.5rem}\
td,th{border:1px solid #ccc;padding:.3rem .7rem;text-align:left}\
.healthy{color:#1a7f37}.caution{color:#9a6700}.failing{color:#cf222e;font-weight:bold}\
.muted{color:#777}";

/// Render the report as a standalone HTML page.
pub fn render_html(report: &WorkspaceReport, configs: &AnalyzerConfigs) -> String {
    let status = OVERALL_THRESHOLDS.status(report.aggregate_health.score);
    let mut html = format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Workspace health report</title>\n<style>{}</style>\n</head>\n<body>\n\
         <h1>Workspace health report</h1>\n",
        STYLE
    );
    html.push_str(&format!(
        "<p>Generated {}. Health <span class=\"{}\">{:.1}</span>, trend {}.{}</p>\n",
        report.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        status,
        report.aggregate_health.score,
        report.aggregate_health.trend,
        if report.partial {
            " <strong>Partial report: the scan was cancelled.</strong>"
        } else {
            ""
        }
    ));

    if !report.recommendations.is_empty() {
        html.push_str("<h2>Workspace recommendations</h2>\n<ul>\n");
        for r in &report.recommendations {
            html.push_str(&format!(
                "<li>[{}] {} <span class=\"muted\">({})</span></li>\n",
                r.priority,
                escape_html(&r.message),
                escape_html(&r.projects.join(", "))
            ));
        }
        html.push_str("</ul>\n");
    }

    for project in &report.project_reports {
        html.push_str(&project_section(project, configs));
    }

    if !report.failed_projects.is_empty() {
        html.push_str("<h2>Projects not scanned</h2>\n<ul>\n");
        for failed in &report.failed_projects {
            html.push_str(&format!(
                "<li>{}: {}</li>\n",
                escape_html(&failed.name),
                escape_html(&failed.error)
            ));
        }
        html.push_str("</ul>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

/// Heading, analyzer table and recommendations for one project.
fn project_section(project: &ProjectReport, configs: &AnalyzerConfigs) -> String {
    let mut html = format!(
        "<h2>{} <span class=\"muted\">{}</span> <span class=\"{}\">{:.1}</span></h2>\n\
         <table>\n<tr><th>Analyzer</th><th>Score</th><th>Status</th><th>Issues</th></tr>\n",
        escape_html(&project.project_name),
        project.kind,
        project.status(),
        project.overall_score
    );

    for (name, summary) in &project.summaries {
        let status = configs
            .get(name)
            .map(|c| c.thresholds.status(summary.score).to_string())
            .unwrap_or_default();
        html.push_str(&format!(
            "<tr><td>{}</td><td>{:.1}</td><td class=\"{}\">{}</td><td>{}</td></tr>\n",
            escape_html(name),
            summary.score,
            status,
            status,
            summary.issues.len()
        ));
    }
    for unavailable in &project.unavailable {
        html.push_str(&format!(
            "<tr><td>{}</td><td>-</td><td class=\"muted\">unavailable</td><td>{}</td></tr>\n",
            escape_html(&unavailable.analyzer),
            escape_html(&unavailable.errors.join("; "))
        ));
    }
    html.push_str("</table>\n");

    if !project.recommendations.is_empty() {
        html.push_str("<ul>\n");
        for r in &project.recommendations {
            html.push_str(&format!("<li>[{}] {}</li>\n", r.priority, escape_html(&r.message)));
        }
        html.push_str("</ul>\n");
    }
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{AggregateHealth, Issue, Recommendation, Severity, Summary, Trend, UnavailableAnalyzer};
    use crate::workspace::ProjectKind;
    use chrono::Utc;
    use indexmap::IndexMap;
    use std::collections::BTreeMap;

    fn sample_report() -> WorkspaceReport {
        let summary = Summary {
            score: 55.0,
            issues: vec![Issue::new("duplicate-block", Severity::Warning, "6 lines duplicated")],
            metrics: BTreeMap::from([("matchCount".to_string(), 1.0)]),
        };
        WorkspaceReport {
            timestamp: Utc::now(),
            project_reports: vec![ProjectReport {
                project_name: "web<app>".to_string(),
                kind: ProjectKind::Application,
                overall_score: 55.0,
                summaries: IndexMap::from([("duplication".to_string(), summary)]),
                recommendations: vec![Recommendation {
                    priority: Priority::High,
                    analyzer: "duplication".to_string(),
                    message: "duplication score 55 is below the critical threshold of 60".to_string(),
                    projects: vec![],
                }],
                unavailable: vec![UnavailableAnalyzer {
                    analyzer: "bundle-size".to_string(),
                    errors: vec!["no build output found".to_string()],
                }],
            }],
            aggregate_health: AggregateHealth {
                score: 55.0,
                trend: Trend::Stable,
            },
            critical_issues: BTreeMap::from([("duplication".to_string(), 0)]),
            recommendations: vec![],
            partial: true,
            failed_projects: vec![],
        }
    }

    #[test]
    fn test_json_field_names() {
        let mut buf = Vec::new();
        write_json(&sample_report(), &mut buf).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&buf).unwrap();

        let project = &json["projectReports"][0];
        assert_eq!(project["projectName"], "web<app>");
        assert_eq!(project["kind"], "application");
        assert_eq!(project["overallScore"], 55.0);
        assert_eq!(project["summaries"]["duplication"]["issues"][0]["severity"], "warning");
        assert_eq!(json["aggregateHealth"]["trend"], "stable");
        assert_eq!(json["partial"], true);
        assert!(json["criticalIssues"].is_object());
        assert!(json["failedProjects"].is_array());
    }

    #[test]
    fn test_summary_lines() {
        colored::control::set_override(false);
        let mut buf = Vec::new();
        write_summary(&sample_report(), &AnalyzerConfigs::defaults(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains("duplication    55.0  failing"));
        assert!(text.contains("bundle-size"));
        assert!(text.contains("unavailable"));
        assert!(text.contains("PARTIAL"));
        assert!(text.contains("below the critical threshold"));
    }

    #[test]
    fn test_html_escapes_content() {
        let html = render_html(&sample_report(), &AnalyzerConfigs::defaults());
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("web&lt;app&gt;"));
        assert!(!html.contains("web<app>"));
        assert!(html.contains("class=\"failing\""));
        assert!(html.contains("no build output found"));
    }

    #[test]
    fn test_output_keeps_analyzer_order() {
        colored::control::set_override(false);
        let mut report = sample_report();
        let summaries = &mut report.project_reports[0].summaries;
        let duplication = summaries[0].clone();
        summaries.clear();
        summaries.insert("type-safety".to_string(), duplication.clone());
        summaries.insert("duplication".to_string(), duplication);

        let mut buf = Vec::new();
        write_summary(&report, &AnalyzerConfigs::defaults(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.find("type-safety").unwrap() < text.find("duplication ").unwrap());

        let html = render_html(&report, &AnalyzerConfigs::defaults());
        assert!(html.find("<td>type-safety</td>").unwrap() < html.find("<td>duplication</td>").unwrap());
    }
}
