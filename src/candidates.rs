//! Candidate enumeration from a file-index export.
//!
//! The index is line oriented; each line carries its path as the first
//! double-quoted field, e.g. `"C:\Windows\System32\drivers\acpi.sys",8192,...`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{DrvScanError, Result};

/// First double-quoted substring of a line, if it is closed and non-empty
fn quoted_path(line: &str) -> Option<&str> {
    let start = line.find('"')? + 1;
    let len = line[start..].find('"')?;
    let path = &line[start..start + len];
    (!path.is_empty()).then_some(path)
}

/// Collect the quoted path of every line of an index.
pub fn parse_file_index<R: BufRead>(reader: R) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for line in reader.lines() {
        if let Some(path) = quoted_path(&line?) {
            paths.push(PathBuf::from(path));
        }
    }
    Ok(paths)
}

/// Keep paths whose extension matches one of `extensions`, ignoring ASCII case.
pub fn filter_by_extension(paths: Vec<PathBuf>, extensions: &[String]) -> Vec<PathBuf> {
    paths
        .into_iter()
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
        })
        .collect()
}

/// Read an index file and return the driver candidates it lists.
pub fn load_candidates(path: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let file = File::open(path).map_err(|e| DrvScanError::io(path, e))?;
    let listed = parse_file_index(BufReader::new(file)).map_err(|e| DrvScanError::io(path, e))?;
    let total = listed.len();
    let candidates = filter_by_extension(listed, extensions);

    debug!(
        index = %path.display(),
        listed = total,
        candidates = candidates.len(),
        "Loaded candidate list"
    );
    Ok(candidates)
}
