//! Candidate list loading feeding a batch.

use std::path::PathBuf;

use drvscan::candidates::load_candidates;
use drvscan::scanner::batch::scan_batch;
use drvscan::scanner::{ImportScanner, TargetSet};
use drvscan::DrvScanError;

use crate::common::{write_driver, write_file, write_index};

#[test]
fn test_index_to_report() {
    let dir = tempfile::tempdir().unwrap();
    let listed = vec![
        write_driver(dir.path(), "gdrv.sys", &["MmMapIoSpace"]),
        write_driver(dir.path(), "UPPER.SYS", &["MmCopyVirtualMemory"]),
        write_file(dir.path(), "helper.dll", b"MZ not scanned"),
    ];
    let index = write_index(dir.path(), &listed);

    let candidates = load_candidates(&index, &["sys".to_string()]).unwrap();
    assert_eq!(candidates, listed[..2].to_vec());

    let report = scan_batch(&candidates, &ImportScanner::new(TargetSet::default()), 2);
    assert_eq!(report.total_candidates, 2);
    assert_eq!(report.flagged.len(), 2);
}

#[test]
fn test_unreadable_index_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_candidates(&dir.path().join("missing.efu"), &["sys".to_string()]).unwrap_err();
    assert!(matches!(err, DrvScanError::Io { .. }));
}

#[test]
fn test_lines_without_paths_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let index = write_file(
        dir.path(),
        "odd.efu",
        b"header line\n\n\"\",1\n\"C:\\drivers\\a.sys\",1\nbroken \"line.sys\n",
    );

    let candidates = load_candidates(&index, &["sys".to_string()]).unwrap();
    assert_eq!(candidates, vec![PathBuf::from("C:\\drivers\\a.sys")]);
}
