//! Command-line interface for healthscan.

use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::analyzer::AnalyzerRegistry;
use crate::config::{self, ScanConfig, DEFAULT_CONFIG_TEMPLATE};
use crate::report::{self, render, AnalyzerConfigs, WorkspaceReport};
use crate::scan::{CancelToken, Scanner};
use crate::workspace;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

const DEFAULT_HTML_OUTPUT: &str = "healthscan-report.html";

/// Workspace code health scanner.
///
/// Runs duplication, complexity, dependency, bundle-size and type-safety
/// analyzers over every project in a workspace and aggregates the results
/// into a weighted health report.
#[derive(Parser)]
#[command(name = "healthscan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a workspace and report its health
    Scan(ScanArgs),
    /// Write a default healthscan.yaml
    Init(InitArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Html,
}

/// Arguments for the scan command.
#[derive(Parser)]
pub struct ScanArgs {
    /// Workspace root
    #[arg(default_value = ".")]
    pub root: PathBuf,

    /// Scan a single project by name
    #[arg(short, long)]
    pub project: Option<String>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Report file (JSON defaults to stdout, HTML to healthscan-report.html)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Path to config file (default: auto-discover in the workspace root)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum projects scanned concurrently
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Run without prompting
    #[arg(short = 'y', long, visible_alias = "non-interactive")]
    pub yes: bool,

    /// Earlier JSON report used to compute the trend
    #[arg(long)]
    pub previous: Option<PathBuf>,
}

/// Arguments for the init command.
#[derive(Parser)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = "healthscan.yaml")]
    pub output: PathBuf,
}

fn load_config(args: &ScanArgs) -> anyhow::Result<ScanConfig> {
    let mut config = match &args.config {
        Some(path) => ScanConfig::parse_file(path)?,
        None => {
            let (config, found) = ScanConfig::discover(&args.root)?;
            match found {
                Some(path) => debug!("using config {}", path.display()),
                None => debug!("no config file found, using defaults"),
            }
            config
        }
    };
    if args.jobs.is_some() {
        config.jobs = args.jobs;
    }
    config::validate(&config)?;
    Ok(config)
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("█▓▒░ "));
    }
    pb
}

/// Run the scan command.
pub async fn run_scan(args: &ScanArgs) -> anyhow::Result<i32> {
    if args.yes {
        debug!("non-interactive mode");
    }

    let config = match load_config(args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return Ok(EXIT_ERROR);
        }
    };

    let previous = match &args.previous {
        Some(path) => {
            let loaded = std::fs::read_to_string(path)
                .map_err(anyhow::Error::from)
                .and_then(|content| WorkspaceReport::from_json(&content));
            match loaded {
                Ok(report) => Some(report),
                Err(e) => {
                    eprintln!("Error: cannot load previous report {}: {:#}", path.display(), e);
                    return Ok(EXIT_ERROR);
                }
            }
        }
        None => None,
    };

    let projects = match workspace::discover_projects(&args.root, &config.workspace)
        .and_then(|all| workspace::select_projects(all, args.project.as_deref()))
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };
    info!("found {} projects in {}", projects.len(), args.root.display());

    let configs = AnalyzerConfigs::from_config(&config);
    let cancel = CancelToken::new();
    let scanner = Scanner::new(AnalyzerRegistry::with_defaults(), config)?
        .with_progress(progress_bar())
        .with_cancel_token(cancel.clone());

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, finishing projects already in progress");
            cancel.cancel();
        }
    });

    let outcome = scanner.scan(projects).await;
    interrupt.abort();

    let report = report::aggregate_workspace(&outcome, &configs, previous.as_ref());
    write_report(args, &report, &configs)?;

    if report.has_failures(&configs) {
        Ok(EXIT_FAILED)
    } else {
        Ok(EXIT_SUCCESS)
    }
}

fn write_report(args: &ScanArgs, report: &WorkspaceReport, configs: &AnalyzerConfigs) -> anyhow::Result<()> {
    match (args.format, &args.output) {
        (OutputFormat::Json, None) => {
            // stdout carries the JSON, so the summary goes to stderr
            render::write_json(report, std::io::stdout().lock())?;
            render::write_summary(report, configs, std::io::stderr().lock())?;
        }
        (OutputFormat::Json, Some(path)) => {
            let file = std::fs::File::create(path)?;
            render::write_json(report, std::io::BufWriter::new(file))?;
            render::write_summary(report, configs, std::io::stdout().lock())?;
            println!("  Report written to {}", path.display());
        }
        (OutputFormat::Html, output) => {
            let path = output.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_HTML_OUTPUT));
            std::fs::write(&path, render::render_html(report, configs))?;
            render::write_summary(report, configs, std::io::stdout().lock())?;
            println!("  Report written to {}", path.display());
        }
    }
    std::io::stdout().flush()?;
    Ok(())
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    if args.output.exists() {
        eprintln!("Error: file already exists: {}", args.output.display());
        eprintln!("Remove it or use --output to specify a different path");
        return Ok(EXIT_ERROR);
    }

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("Error: failed to create directory: {}", e);
                return Ok(EXIT_ERROR);
            }
        }
    }

    if let Err(e) = std::fs::write(&args.output, DEFAULT_CONFIG_TEMPLATE) {
        eprintln!("Error: failed to write config: {}", e);
        return Ok(EXIT_ERROR);
    }

    println!("Created {}", args.output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to tune analyzers and thresholds", args.output.display());
    println!("  2. Run: healthscan scan . --config {}", args.output.display());

    Ok(EXIT_SUCCESS)
}
