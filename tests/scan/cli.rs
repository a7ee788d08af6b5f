//! Exit status and report output of the `drvscan` binary.

use std::process::{Command, Output};

use crate::common::{write_driver, write_file, write_index};

fn drvscan(dir: &std::path::Path, args: &[&std::ffi::OsStr]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_drvscan"))
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap()
}

#[test]
fn test_wrong_argument_count_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = drvscan(dir.path(), &[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage:"));

    let extra = ["a.efu", "b.json", "c"].map(std::ffi::OsStr::new);
    assert_eq!(drvscan(dir.path(), &extra).status.code(), Some(1));
}

#[test]
fn test_missing_index_fails() {
    let dir = tempfile::tempdir().unwrap();
    let index = dir.path().join("missing.efu");
    let output = drvscan(dir.path(), &[index.as_os_str()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(!dir.path().join("log.txt").exists());
}

#[test]
fn test_failed_scans_still_exit_zero() {
    let dir = tempfile::tempdir().unwrap();
    let listed = vec![
        write_file(dir.path(), "notes.sys", b"plain text, not an image"),
        write_driver(dir.path(), "RTCore64.sys", &["MmMapIoSpace"]),
    ];
    let index = write_index(dir.path(), &listed);

    let output = drvscan(dir.path(), &[index.as_os_str()]);
    assert_eq!(output.status.code(), Some(0));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[~] Found 2 drivers."));
    assert!(stdout.contains("[~] Done, found 1 potentially vulnerable drivers."));

    let log = std::fs::read_to_string(dir.path().join("log.txt")).unwrap();
    assert!(log.starts_with("RTCore64.sys"));
    assert!(log.contains("[MmMapIoSpace] (1)"));
    assert!(!log.contains("notes.sys"));
}

#[test]
fn test_unwritable_report_still_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    let listed = vec![write_driver(dir.path(), "gdrv.sys", &["MmMapIoSpace"])];
    let index = write_index(dir.path(), &listed);
    // A directory where the report file should go
    std::fs::create_dir(dir.path().join("log.txt")).unwrap();

    let output = drvscan(dir.path(), &[index.as_os_str()]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unable to write report"));
}

#[test]
fn test_invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let index = write_index(dir.path(), &[]);
    let config = write_file(dir.path(), "scan.json", br#"{ "targets": [] }"#);

    let output = drvscan(dir.path(), &[index.as_os_str(), config.as_os_str()]);
    assert_eq!(output.status.code(), Some(1));
}
