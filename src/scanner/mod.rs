//! Per-file import scanning.
//!
//! [`ImportScanner`] loads one candidate image, walks its import table and
//! intersects the imported names with a shared [`TargetSet`]. Failures are
//! wrapped in [`ScanError`] with the offending path; they never escape a
//! batch.

pub mod batch;
pub mod config;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace};

use crate::formats::pe::{Architecture, Machine, ParseOptions, PeError, PeImage};
use crate::io::error::IoError;
use crate::io::{IOLimits, SafeReader};
use config::ScanConfig;

/// Kernel routines that hand out arbitrary physical or virtual memory access.
pub const DEFAULT_TARGET_IMPORTS: &[&str] = &[
    "MmCopyVirtualMemory",
    "MmMapIoSpace",
    "MmMapIoSpaceEx",
    "MmGetPhysicalAddress",
    "MmCopyMemory",
    "MmMapLockedPages",
    "MmMapLockedPagesSpecifyCache",
    "ZwMapViewOfSection",
    "ZwOpenSection",
    "MmGetVirtualForPhysical",
];

/// Immutable set of import names that flag a driver. Matching is exact and
/// case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSet {
    names: BTreeSet<String>,
}

impl TargetSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn default_dangerous() -> Self {
        Self::new(DEFAULT_TARGET_IMPORTS.iter().copied())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in ascending order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Targets present in `imported`
    pub fn intersect<'a, I>(&self, imported: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        imported
            .into_iter()
            .filter(|name| self.contains(name))
            .map(str::to_string)
            .collect()
    }
}

impl Default for TargetSet {
    fn default() -> Self {
        Self::default_dangerous()
    }
}

/// Outcome of a successful scan of one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub path: PathBuf,
    pub architecture: Architecture,
    pub machine: Machine,
    /// Distinct by-name imports seen in the image
    pub imported_count: usize,
    /// Targets the image imports, each once
    pub matched: BTreeSet<String>,
}

impl ScanResult {
    pub fn is_flagged(&self) -> bool {
        !self.matched.is_empty()
    }

    pub fn match_count(&self) -> usize {
        self.matched.len()
    }
}

#[derive(Debug, Error)]
pub enum ScanFailure {
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Pe(#[from] PeError),
}

/// A failed scan together with the offending path
#[derive(Debug, Error)]
#[error("{}: {cause}", .path.display())]
pub struct ScanError {
    pub path: PathBuf,
    #[source]
    pub cause: ScanFailure,
}

impl ScanError {
    pub fn new(path: impl Into<PathBuf>, cause: impl Into<ScanFailure>) -> Self {
        Self {
            path: path.into(),
            cause: cause.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// Scans images for target imports. Cheap to clone; the target set is shared.
#[derive(Debug, Clone)]
pub struct ImportScanner {
    targets: Arc<TargetSet>,
    limits: IOLimits,
    options: ParseOptions,
}

impl ImportScanner {
    pub fn new(targets: TargetSet) -> Self {
        Self::with_limits(targets, IOLimits::default(), ParseOptions::default())
    }

    pub fn with_limits(targets: TargetSet, limits: IOLimits, options: ParseOptions) -> Self {
        Self {
            targets: Arc::new(targets),
            limits,
            options,
        }
    }

    pub fn from_config(config: &ScanConfig) -> Self {
        Self::with_limits(
            TargetSet::new(config.targets.iter().cloned()),
            config.io.limits(),
            config.parse.clone(),
        )
    }

    pub fn targets(&self) -> &TargetSet {
        &self.targets
    }

    pub fn limits(&self) -> IOLimits {
        self.limits
    }

    /// Scan the image at `path`.
    pub fn scan(&self, path: &Path) -> Result<ScanResult> {
        let reader =
            SafeReader::open(path, self.limits).map_err(|e| ScanError::new(path, e))?;
        self.scan_bytes(path, reader.bytes())
    }

    /// Scan an image already in memory; `path` only labels the result.
    pub fn scan_bytes(&self, path: &Path, data: &[u8]) -> Result<ScanResult> {
        let image = PeImage::with_options(data, self.options.clone())
            .map_err(|e| ScanError::new(path, e))?;
        let imports = image.imports().map_err(|e| ScanError::new(path, e))?;

        let names = imports.names();
        let matched = self.targets.intersect(names.iter().copied());

        trace!(
            path = %path.display(),
            imports = names.len(),
            skipped_modules = imports.skipped_modules,
            skipped_entries = imports.skipped_entries(),
            limited_modules = imports.limited_modules,
            "Walked import table"
        );
        if !matched.is_empty() {
            debug!(path = %path.display(), matched = ?matched, "Driver imports target routines");
        }

        Ok(ScanResult {
            path: path.to_path_buf(),
            architecture: image.architecture(),
            machine: image.machine(),
            imported_count: names.len(),
            matched,
        })
    }
}

/// Scan one file against a target set with default limits.
pub fn scan(path: &Path, targets: &TargetSet) -> Result<ScanResult> {
    ImportScanner::new(targets.clone()).scan(path)
}
