//! Healthscan - workspace code health scanner.
//!
//! Healthscan runs a set of independent analyzers over every project in a
//! workspace and aggregates their findings into weighted, threshold-driven
//! health reports.
//!
//! # Architecture
//!
//! - `config`: YAML scan configuration and validation
//! - `workspace`: project discovery and resolution
//! - `analyzer`: the analyzer contract, registry and built-in analyzers
//! - `scan`: concurrent, cancellable scans across projects
//! - `report`: scoring profiles, aggregation and output formatting
//!
//! # Adding a New Analyzer
//!
//! See `src/analyzer/mod.rs`. Implement the `Analyzer` trait, register it in
//! `AnalyzerRegistry::with_defaults` and give it a profile in
//! `AnalyzerConfigs::defaults`.

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod logging;
pub mod report;
pub mod scan;
pub mod workspace;

pub use analyzer::{
    Analyzer, AnalyzerData, AnalyzerRegistry, AnalyzerResult, DuplicateDetector, DuplicateMatch,
    ScanContext,
};
pub use config::{ConfigError, ScanConfig};
pub use report::{AnalyzerConfig, AnalyzerConfigs, ProjectReport, Summary, WorkspaceReport};
pub use scan::{CancelToken, ScanOutcome, Scanner};
pub use workspace::{Project, ProjectKind};
