//! Aggregation and rendering of batch results.
//!
//! The [`Aggregator`] is the only place per-file outcomes are collected. It
//! keeps flagged drivers, counts clean ones and records every failure with its
//! reason, so no candidate silently disappears from the report.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{DrvScanError, Result};
use crate::scanner::config::{ReportConfig, ReportFormat};
use crate::scanner::{ScanError, ScanResult, TargetSet};

/// Spaces between the longest file name and the symbol column
const COLUMN_GAP: usize = 5;

/// A candidate that could not be scanned
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedScan {
    pub path: PathBuf,
    pub reason: String,
}

impl From<ScanError> for FailedScan {
    fn from(err: ScanError) -> Self {
        Self {
            reason: err.cause.to_string(),
            path: err.path,
        }
    }
}

/// Final accounting for one batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub total_candidates: usize,
    /// Images parsed successfully, flagged or not
    pub scanned: usize,
    /// Scanned images with no target imports
    pub clean: usize,
    pub failures: Vec<FailedScan>,
    /// Flagged images, most matches first
    pub flagged: Vec<ScanResult>,
}

/// Collects scan outcomes into a [`BatchReport`]
#[derive(Debug, Default)]
pub struct Aggregator {
    total_candidates: usize,
    scanned: usize,
    clean: usize,
    failures: Vec<FailedScan>,
    flagged: Vec<ScanResult>,
}

impl Aggregator {
    pub fn new(total_candidates: usize) -> Self {
        Self {
            total_candidates,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: std::result::Result<ScanResult, ScanError>) {
        match outcome {
            Ok(result) => {
                self.scanned += 1;
                if result.is_flagged() {
                    self.flagged.push(result);
                } else {
                    self.clean += 1;
                }
            }
            Err(err) => {
                warn!(path = %err.path.display(), error = %err.cause, "Scan failed");
                self.failures.push(err.into());
            }
        }
    }

    pub fn finish(mut self) -> BatchReport {
        self.flagged.sort_by(rank);
        if self.scanned + self.failures.len() != self.total_candidates {
            warn!(
                expected = self.total_candidates,
                scanned = self.scanned,
                failed = self.failures.len(),
                "Outcome count differs from candidate count"
            );
        }

        BatchReport {
            total_candidates: self.total_candidates,
            scanned: self.scanned,
            clean: self.clean,
            failures: self.failures,
            flagged: self.flagged,
        }
    }
}

/// Descending match count, then ascending path
fn rank(a: &ScanResult, b: &ScanResult) -> Ordering {
    b.match_count()
        .cmp(&a.match_count())
        .then_with(|| a.path.cmp(&b.path))
}

/// Last component of a path, splitting on both separators so index files
/// written on Windows render the same everywhere.
pub fn display_name(path: &Path) -> String {
    let text = path.to_string_lossy();
    text.rsplit(['/', '\\']).next().unwrap_or_default().to_string()
}

/// One line per flagged driver: `name<pad>[sym / sym] (n)`
pub fn render_text(report: &BatchReport) -> String {
    let names: Vec<String> = report.flagged.iter().map(|r| display_name(&r.path)).collect();
    let width = names.iter().map(|n| n.chars().count()).max().unwrap_or(0) + COLUMN_GAP;

    let mut out = String::new();
    for (name, result) in names.iter().zip(&report.flagged) {
        let symbols: Vec<&str> = result.matched.iter().map(String::as_str).collect();
        let pad = width - name.chars().count();
        out.push_str(&format!(
            "{name}{:pad$}[{}] ({})\n",
            "",
            symbols.join(" / "),
            symbols.len()
        ));
    }
    out
}

#[derive(Serialize)]
struct JsonReport<'a> {
    generated_at: String,
    total_candidates: usize,
    scanned: usize,
    clean: usize,
    errored: usize,
    targets: Vec<&'a str>,
    flagged: Vec<JsonFlagged<'a>>,
    failures: &'a [FailedScan],
}

#[derive(Serialize)]
struct JsonFlagged<'a> {
    path: &'a Path,
    architecture: String,
    matched: Vec<&'a str>,
}

pub fn render_json(report: &BatchReport, targets: &TargetSet) -> Result<String> {
    let doc = JsonReport {
        generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        total_candidates: report.total_candidates,
        scanned: report.scanned,
        clean: report.clean,
        errored: report.failures.len(),
        targets: targets.iter().collect(),
        flagged: report
            .flagged
            .iter()
            .map(|r| JsonFlagged {
                path: &r.path,
                architecture: r.architecture.to_string(),
                matched: r.matched.iter().map(String::as_str).collect(),
            })
            .collect(),
        failures: &report.failures,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Render the report in the configured format and write it out.
pub fn write_report(report: &BatchReport, config: &ReportConfig, targets: &TargetSet) -> Result<()> {
    let body = match config.format {
        ReportFormat::Text => render_text(report),
        ReportFormat::Json => render_json(report, targets)?,
    };
    fs::write(&config.output, body).map_err(|e| DrvScanError::io(&config.output, e))?;
    debug!(path = %config.output.display(), format = ?config.format, "Report written");
    Ok(())
}

/// Human summary of a batch
pub fn summary_lines(report: &BatchReport) -> Vec<String> {
    let mut lines = vec![
        format!("Candidates: {}", report.total_candidates),
        format!("Scanned:    {}", report.scanned),
        format!("Errored:    {}", report.failures.len()),
    ];
    lines.extend(
        report
            .failures
            .iter()
            .map(|f| format!("  {}: {}", f.path.display(), f.reason)),
    );
    lines.push(format!("Flagged:    {}", report.flagged.len()));
    lines
}
