//! Batch scanning, aggregation and report output.

use std::fs;

use drvscan::report::{display_name, render_text, write_report};
use drvscan::scanner::batch::scan_batch;
use drvscan::scanner::config::{ReportConfig, ReportFormat, ScanConfig};
use drvscan::scanner::{ImportScanner, TargetSet};

use crate::common::{write_driver, write_file};

#[test]
fn test_two_matches_rank_above_one() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        write_driver(dir.path(), "one_a.sys", &["MmMapIoSpace", "IoCreateDevice"]),
        write_driver(dir.path(), "one_b.sys", &["MmCopyVirtualMemory"]),
        write_driver(
            dir.path(),
            "two.sys",
            &["MmMapIoSpace", "MmGetPhysicalAddress", "IoDeleteDevice"],
        ),
    ];

    let report = scan_batch(&paths, &ImportScanner::new(TargetSet::default()), 2);
    let order: Vec<String> = report.flagged.iter().map(|r| display_name(&r.path)).collect();
    assert_eq!(order, vec!["two.sys", "one_a.sys", "one_b.sys"]);
    assert_eq!(report.flagged[0].match_count(), 2);
}

#[test]
fn test_non_pe_is_counted_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        write_driver(dir.path(), "good.sys", &["ZwMapViewOfSection"]),
        write_file(dir.path(), "text.sys", b"this is not a driver"),
        write_driver(dir.path(), "clean.sys", &["IoCreateDevice"]),
        dir.path().join("vanished.sys"),
    ];

    let report = scan_batch(&paths, &ImportScanner::new(TargetSet::default()), 3);
    assert_eq!(report.total_candidates, 4);
    assert_eq!(report.scanned, 2);
    assert_eq!(report.clean, 1);
    assert_eq!(report.flagged.len(), 1);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.scanned + report.failures.len(), report.total_candidates);
    assert_eq!(report.flagged.len() + report.clean, report.scanned);

    let failed: Vec<String> = report.failures.iter().map(|f| display_name(&f.path)).collect();
    assert!(failed.contains(&"text.sys".to_string()));
    assert!(failed.contains(&"vanished.sys".to_string()));
    assert!(report
        .failures
        .iter()
        .any(|f| f.reason == "Not a PE file"));
}

#[test]
fn test_worker_count_does_not_change_results() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = (0..12)
        .map(|i| {
            let imports: &[&str] = match i % 3 {
                0 => &["MmMapIoSpace", "MmCopyMemory"],
                1 => &["MmMapIoSpace"],
                _ => &["KeBugCheckEx"],
            };
            write_driver(dir.path(), &format!("drv{i:02}.sys"), imports)
        })
        .collect();

    let scanner = ImportScanner::new(TargetSet::default());
    let single = scan_batch(&paths, &scanner, 1);
    let many = scan_batch(&paths, &scanner, 8);
    assert_eq!(single, many);
    assert_eq!(single.flagged.len(), 8);
    assert_eq!(single.clean, 4);
}

#[test]
fn test_text_report_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        write_driver(dir.path(), "RTCore64.sys", &["MmMapIoSpace", "MmGetPhysicalAddress"]),
        write_driver(dir.path(), "a.sys", &["MmCopyVirtualMemory"]),
    ];
    let config = ScanConfig {
        report: ReportConfig {
            output: dir.path().join("log.txt"),
            format: ReportFormat::Text,
        },
        ..ScanConfig::default()
    };
    let scanner = ImportScanner::from_config(&config);

    let report = scan_batch(&paths, &scanner, 2);
    write_report(&report, &config.report, scanner.targets()).unwrap();

    let text = fs::read_to_string(&config.report.output).unwrap();
    assert_eq!(text, render_text(&report));
    assert_eq!(
        text,
        "RTCore64.sys     [MmGetPhysicalAddress / MmMapIoSpace] (2)\n\
         a.sys            [MmCopyVirtualMemory] (1)\n"
    );
}

#[test]
fn test_json_report_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let paths = vec![
        write_driver(dir.path(), "x.sys", &["ZwOpenSection"]),
        write_file(dir.path(), "y.sys", b"MZ"),
    ];
    let report_config = ReportConfig {
        output: dir.path().join("report.json"),
        format: ReportFormat::Json,
    };
    let targets = TargetSet::default();

    let report = scan_batch(&paths, &ImportScanner::new(targets.clone()), 1);
    write_report(&report, &report_config, &targets).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_config.output).unwrap()).unwrap();
    assert_eq!(value["total_candidates"], 2);
    assert_eq!(value["errored"], 1);
    assert_eq!(value["flagged"][0]["matched"][0], "ZwOpenSection");
    assert_eq!(value["targets"].as_array().unwrap().len(), targets.len());
}
