//! Parallel scanning of a candidate list.

use std::path::PathBuf;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::report::{Aggregator, BatchReport};
use crate::scanner::ImportScanner;

/// Scan every candidate on a pool of `workers` threads and fold the outcomes
/// into one report. Every path ends up either scanned or in `failures`.
pub fn scan_batch(paths: &[PathBuf], scanner: &ImportScanner, workers: usize) -> BatchReport {
    let span = crate::span_trace!("scan_batch", candidates = paths.len(), workers);
    let _guard = span.enter();

    let scan_all = || paths.par_iter().map(|p| scanner.scan(p)).collect::<Vec<_>>();

    let outcomes = match rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("drvscan-{i}"))
        .build()
    {
        Ok(pool) => pool.install(scan_all),
        Err(err) => {
            warn!(error = %err, workers, "Falling back to the global thread pool");
            scan_all()
        }
    };

    // Single owner folds the results; workers share nothing mutable
    let mut aggregator = Aggregator::new(paths.len());
    for outcome in outcomes {
        aggregator.record(outcome);
    }
    let report = aggregator.finish();

    info!(
        total = report.total_candidates,
        scanned = report.scanned,
        failed = report.failures.len(),
        flagged = report.flagged.len(),
        "Batch complete"
    );
    report
}
