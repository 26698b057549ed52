//! Content-addressed duplicate code detection.
//!
//! The detector works on raw text, not syntax trees:
//!
//! 1. Every file is cut into overlapping line windows (`min_lines` up to
//!    `max_window` lines from each start line). Windows shorter than
//!    `min_chars` characters once trimmed are dropped.
//! 2. Each window is normalized (whitespace runs collapsed, string literals
//!    and numerals replaced by placeholders, lowercased) and hashed with
//!    SHA-256.
//! 3. Windows sharing a fingerprint across different files become candidate
//!    matches.
//! 4. Candidates are filtered largest-first so that, per ordered file pair,
//!    no two accepted matches overlap on either side. The nested sub-windows
//!    of a large duplicate collapse into the single largest match.

use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{DuplicationSettings, ExcludeMatcher};

use super::{
    collect_source_files, relative_path, Analyzer, AnalyzerData, ScanContext, DUPLICATION,
    SOURCE_EXTENSIONS,
};

/// Lines of the newer block kept as the match sample.
const SAMPLE_LINES: usize = 10;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    // A single quote only opens a literal after a non-word character, so
    // apostrophes inside comments ("don't") stay text.
    static ref QUOTED_LITERAL: Regex = Regex::new(
        r#"(?m)(^|[^\w])'(?:[^'\\\n]|\\.)*'|"(?:[^"\\\n]|\\.)*"|`(?:[^`\\\n]|\\.)*`"#
    )
    .unwrap();
    // Rust quotes: single quotes are char literals or lifetimes.
    static ref RUST_STRING: Regex = Regex::new(r#""(?:[^"\\\n]|\\.)*""#).unwrap();
    static ref RUST_CHAR: Regex =
        Regex::new(r"'(?:[^'\\\n]|\\u\{[0-9a-fA-F]{1,6}\}|\\[^\n])'").unwrap();
    static ref NUMERAL: Regex = Regex::new(r"\d+(?:\.\d+)?").unwrap();
}

/// How string literals are delimited in a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QuoteStyle {
    /// Single, double and backtick quotes all delimit strings.
    #[default]
    Standard,
    /// Only double quotes delimit strings; `'x'` is a char literal and
    /// `'a` a lifetime.
    Rust,
}

impl QuoteStyle {
    pub fn for_path(path: &str) -> Self {
        if path.ends_with(".rs") {
            QuoteStyle::Rust
        } else {
            QuoteStyle::Standard
        }
    }
}

/// Normalize a block of text for fingerprinting.
///
/// The original text is never modified; this only produces the comparison key.
pub fn normalize(text: &str) -> String {
    normalize_with(text, QuoteStyle::Standard)
}

/// Normalize with the literal rules of `style`.
///
/// Literals are replaced before whitespace is collapsed and never span a
/// line break, so a stray quote cannot swallow the code after it.
pub fn normalize_with(text: &str, style: QuoteStyle) -> String {
    let no_strings = match style {
        QuoteStyle::Standard => QUOTED_LITERAL.replace_all(text, |caps: &Captures| {
            let prefix = caps.get(1).map_or("", |m| m.as_str());
            format!("{}\"str\"", prefix)
        }),
        QuoteStyle::Rust => {
            let strings = RUST_STRING.replace_all(text, "\"str\"");
            Cow::Owned(RUST_CHAR.replace_all(&strings, "'c'").into_owned())
        }
    };
    let collapsed = WHITESPACE.replace_all(&no_strings, " ");
    let no_numbers = NUMERAL.replace_all(&collapsed, "0");
    no_numbers.to_lowercase()
}

/// SHA-256 digest of a block's normalized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Fingerprint of `text` after normalization.
pub fn fingerprint(text: &str) -> Fingerprint {
    fingerprint_with(text, QuoteStyle::Standard)
}

pub fn fingerprint_with(text: &str, style: QuoteStyle) -> Fingerprint {
    let digest = Sha256::digest(normalize_with(text, style).as_bytes());
    Fingerprint(digest.into())
}

/// Inclusive, 1-based line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn overlaps(&self, other: &LineRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A candidate window borrowed from a loaded source file.
#[derive(Debug, Clone)]
pub struct CodeBlock<'a> {
    pub source_file: &'a str,
    pub start_line: usize,
    pub end_line: usize,
    pub raw_content: &'a str,
    pub normalized_hash: Fingerprint,
}

impl CodeBlock<'_> {
    pub fn lines(&self) -> LineRange {
        LineRange::new(self.start_line, self.end_line)
    }

    pub fn line_count(&self) -> usize {
        self.lines().len()
    }
}

/// Two blocks in different files with the same fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateMatch {
    pub file_a: String,
    pub file_b: String,
    pub line_range_a: LineRange,
    pub line_range_b: LineRange,
    pub line_count: usize,
    pub sample_content: String,
}

impl DuplicateMatch {
    /// Whether `self` and `other` describe overlapping regions of the same
    /// ordered file pair.
    pub fn overlaps(&self, other: &DuplicateMatch) -> bool {
        self.file_a == other.file_a
            && self.file_b == other.file_b
            && (self.line_range_a.overlaps(&other.line_range_a)
                || self.line_range_b.overlaps(&other.line_range_b))
    }
}

/// Byte spans of each line, excluding the line terminator.
fn line_spans(content: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = 0;
    for (idx, byte) in content.bytes().enumerate() {
        if byte == b'\n' {
            let end = if idx > start && content.as_bytes()[idx - 1] == b'\r' {
                idx - 1
            } else {
                idx
            };
            spans.push((start, end));
            start = idx + 1;
        }
    }
    if start < content.len() {
        spans.push((start, content.len()));
    }
    spans
}

/// Cut `content` into every window of `min_lines..=max_window` lines.
///
/// Windows are produced in start-line order, shortest first.
pub fn extract_blocks<'a>(
    source_file: &'a str,
    content: &'a str,
    settings: &DuplicationSettings,
) -> Vec<CodeBlock<'a>> {
    let spans = line_spans(content);
    let total = spans.len();
    let style = QuoteStyle::for_path(source_file);
    let mut blocks = Vec::new();

    if settings.min_lines == 0 {
        return blocks;
    }

    for i in 0..total {
        let last = (i + settings.max_window).min(total);
        let first = i + settings.min_lines;
        if first > last {
            break;
        }
        for j in first..=last {
            let raw = &content[spans[i].0..spans[j - 1].1];
            if raw.trim().chars().count() < settings.min_chars {
                continue;
            }
            blocks.push(CodeBlock {
                source_file,
                start_line: i + 1,
                end_line: j,
                raw_content: raw,
                normalized_hash: fingerprint_with(raw, style),
            });
        }
    }

    blocks
}

/// Greedy largest-first overlap filter.
///
/// Matches are stably sorted by `line_count` descending, so equal-size
/// candidates keep discovery order. A match is accepted only if it does not
/// overlap an already accepted match of the same ordered file pair.
pub fn resolve_overlaps(mut matches: Vec<DuplicateMatch>) -> Vec<DuplicateMatch> {
    matches.sort_by(|a, b| b.line_count.cmp(&a.line_count));

    let mut accepted: Vec<DuplicateMatch> = Vec::new();
    let mut by_pair: HashMap<(String, String), Vec<usize>> = HashMap::new();

    for candidate in matches {
        let key = (candidate.file_a.clone(), candidate.file_b.clone());
        let indices = by_pair.entry(key).or_default();
        if indices.iter().any(|&i| accepted[i].overlaps(&candidate)) {
            continue;
        }
        indices.push(accepted.len());
        accepted.push(candidate);
    }

    accepted
}

fn sample_of(raw: &str) -> String {
    raw.lines().take(SAMPLE_LINES).collect::<Vec<_>>().join("\n")
}

/// A loaded source file, path relative to the project root.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

/// Payload produced by the duplication analyzer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicationData {
    pub matches: Vec<DuplicateMatch>,
    pub files_scanned: usize,
    pub total_lines: usize,
    pub duplicated_lines: usize,
    /// Files that could not be read
    #[serde(default)]
    pub skipped_files: Vec<String>,
}

impl DuplicationData {
    /// Share of scanned lines covered by at least one accepted match, in percent.
    pub fn duplication_percentage(&self) -> f64 {
        if self.total_lines == 0 {
            return 0.0;
        }
        self.duplicated_lines as f64 / self.total_lines as f64 * 100.0
    }
}

/// Runs the block extraction / bucketing / overlap pipeline.
#[derive(Debug, Clone, Default)]
pub struct DuplicateDetector {
    settings: DuplicationSettings,
    debug: bool,
}

impl DuplicateDetector {
    pub fn new(settings: DuplicationSettings) -> Self {
        Self {
            settings,
            debug: false,
        }
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Find duplicated regions across `files`, in discovery order.
    pub fn find_duplicates(&self, files: &[SourceFile]) -> Vec<DuplicateMatch> {
        let per_file: Vec<Vec<CodeBlock<'_>>> = files
            .par_iter()
            .map(|f| extract_blocks(&f.path, &f.content, &self.settings))
            .collect();

        if self.debug {
            for (file, blocks) in files.iter().zip(&per_file) {
                debug!("{}: {} candidate blocks", file.path, blocks.len());
            }
        }

        let mut buckets: HashMap<Fingerprint, Vec<&CodeBlock<'_>>> = HashMap::new();
        let mut candidates = Vec::new();

        for block in per_file.iter().flatten() {
            let seen = buckets.entry(block.normalized_hash).or_default();
            for prior in seen.iter().filter(|p| p.source_file != block.source_file) {
                candidates.push(DuplicateMatch {
                    file_a: prior.source_file.to_string(),
                    file_b: block.source_file.to_string(),
                    line_range_a: prior.lines(),
                    line_range_b: block.lines(),
                    line_count: block.line_count(),
                    sample_content: sample_of(block.raw_content),
                });
            }
            seen.push(block);
        }

        if self.debug {
            debug!("{} candidate matches before overlap resolution", candidates.len());
        }

        resolve_overlaps(candidates)
    }

    /// Scan a project directory.
    pub fn scan(&self, root: &Path, excludes: &ExcludeMatcher) -> DuplicationData {
        let paths = collect_source_files(root, excludes, SOURCE_EXTENSIONS);
        let (files, skipped) = load_sources(root, &paths);

        let total_lines = files.iter().map(|f| f.content.lines().count()).sum();
        let matches = self.find_duplicates(&files);
        let duplicated_lines = count_duplicated_lines(&matches);

        DuplicationData {
            files_scanned: files.len(),
            total_lines,
            duplicated_lines,
            matches,
            skipped_files: skipped,
        }
    }
}

fn load_sources(root: &Path, paths: &[PathBuf]) -> (Vec<SourceFile>, Vec<String>) {
    let mut files = Vec::with_capacity(paths.len());
    let mut skipped = Vec::new();

    for path in paths {
        let rel = relative_path(root, path).to_string_lossy().to_string();
        match std::fs::read_to_string(path) {
            Ok(content) => files.push(SourceFile { path: rel, content }),
            Err(e) => {
                warn!("skipping unreadable file {}: {}", path.display(), e);
                skipped.push(rel);
            }
        }
    }

    (files, skipped)
}

/// Distinct (file, line) positions covered by any match side.
fn count_duplicated_lines(matches: &[DuplicateMatch]) -> usize {
    let mut covered: BTreeSet<(&str, usize)> = BTreeSet::new();
    for m in matches {
        for line in m.line_range_a.start..=m.line_range_a.end {
            covered.insert((m.file_a.as_str(), line));
        }
        for line in m.line_range_b.start..=m.line_range_b.end {
            covered.insert((m.file_b.as_str(), line));
        }
    }
    covered.len()
}

/// Analyzer wrapper around [`DuplicateDetector`].
pub struct DuplicationAnalyzer;

#[async_trait::async_trait]
impl Analyzer for DuplicationAnalyzer {
    fn name(&self) -> &'static str {
        DUPLICATION
    }

    async fn analyze(&self, ctx: &ScanContext) -> anyhow::Result<AnalyzerData> {
        let detector = DuplicateDetector::new(ctx.config.duplication.clone()).debug(ctx.debug());
        let root = ctx.project_path().to_path_buf();
        let excludes = ctx.excludes.clone();

        let data = tokio::task::spawn_blocking(move || detector.scan(&root, &excludes)).await?;
        Ok(AnalyzerData::Duplication(data))
    }
}
