//! Configuration for a driver scan.
//!
//! Every section has sensible defaults; a JSON config file only needs the
//! fields it wants to change.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DrvScanError, Result};
use crate::formats::pe::ParseOptions;
use crate::io::{IOLimits, DEFAULT_MAX_FILE_SIZE};
use crate::scanner::DEFAULT_TARGET_IMPORTS;

/// Master configuration for a scan run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// File access limits.
    pub io: IOConfig,
    /// Import walk limits.
    pub parse: ParseOptions,
    /// Symbol names that flag a driver.
    pub targets: Vec<String>,
    /// Candidate list filtering.
    pub candidates: CandidateConfig,
    /// Worker threads; 0 picks the available parallelism.
    pub workers: usize,
    /// Report output.
    pub report: ReportConfig,
    /// Emit JSON log lines instead of the human format.
    pub log_json: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            io: IOConfig::default(),
            parse: ParseOptions::default(),
            targets: DEFAULT_TARGET_IMPORTS.iter().map(|s| s.to_string()).collect(),
            candidates: CandidateConfig::default(),
            workers: 0,
            report: ReportConfig::default(),
            log_json: false,
        }
    }
}

impl ScanConfig {
    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| DrvScanError::io(path, e))?;
        Self::from_json_str(&text).map_err(|e| DrvScanError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        if config.targets.is_empty() {
            return Err(DrvScanError::InvalidInput(
                "target list must name at least one import".to_string(),
            ));
        }
        Ok(config)
    }

    /// Worker count with 0 resolved to the machine's parallelism.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

/// I/O configuration for file reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IOConfig {
    /// Maximum file size to scan (default: 67108864 = 64MB).
    pub max_file_size: u64,
}

impl Default for IOConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl IOConfig {
    pub fn limits(&self) -> IOLimits {
        IOLimits {
            max_file_size: self.max_file_size,
        }
    }
}

/// Candidate list filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateConfig {
    /// Extensions (without the dot) a candidate path must end in.
    pub extensions: Vec<String>,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["sys".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Report output configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Where the report is written (default: log.txt).
    pub output: PathBuf,
    pub format: ReportFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("log.txt"),
            format: ReportFormat::Text,
        }
    }
}
