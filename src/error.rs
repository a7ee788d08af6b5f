//! Error types for the drvscan crate.
//!
//! Parsing and per-file failures have their own types in
//! [`crate::formats::pe`], [`crate::io`] and [`crate::scanner`]; this one
//! covers the glue around a batch: candidate lists, configuration and
//! report output.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-level error for operations outside a single image scan.
#[derive(Debug, Error)]
pub enum DrvScanError {
    /// File I/O errors
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be parsed
    #[error("Invalid configuration in {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DrvScanError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for drvscan operations
pub type Result<T> = std::result::Result<T, DrvScanError>;
