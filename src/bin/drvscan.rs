//! `drvscan <file-index> [config.json]`
//!
//! Reads a file-index export, scans every listed driver for target imports
//! and writes the ranked report.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};

use drvscan::candidates::load_candidates;
use drvscan::logging::{init_tracing, init_tracing_json};
use drvscan::report::{summary_lines, write_report};
use drvscan::scanner::batch::scan_batch;
use drvscan::scanner::config::ScanConfig;
use drvscan::scanner::ImportScanner;

fn run(index: &Path, config_path: Option<&Path>) -> Result<()> {
    let config = match config_path {
        Some(path) => ScanConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ScanConfig::default(),
    };

    if config.log_json {
        init_tracing_json();
    } else {
        init_tracing();
    }

    let drivers = load_candidates(index, &config.candidates.extensions)
        .with_context(|| format!("reading candidate list {}", index.display()))?;
    println!("[~] Found {} drivers.", drivers.len());

    let scanner = ImportScanner::from_config(&config);
    println!("[~] Searching for the following imports: ");
    for (i, name) in scanner.targets().iter().enumerate() {
        println!("  ({i}) {name}");
    }

    let report = scan_batch(&drivers, &scanner, config.effective_workers());

    if let Err(err) = write_report(&report, &config.report, scanner.targets()) {
        eprintln!("Unable to write report: {err}");
    }

    for line in summary_lines(&report) {
        eprintln!("{line}");
    }
    println!(
        "[~] Done, found {} potentially vulnerable drivers.",
        report.flagged.len()
    );
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    if !(2..=3).contains(&args.len()) {
        let program = args.first().map(String::as_str).unwrap_or("drvscan");
        eprintln!("Usage: {program} <file-index> [config.json]");
        return ExitCode::FAILURE;
    }

    match run(Path::new(&args[1]), args.get(2).map(Path::new)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
