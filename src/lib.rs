//! Import-table scanner for kernel drivers.
//!
//! Flags driver images whose import tables name kernel routines that hand out
//! arbitrary memory access (`MmMapIoSpace`, `MmCopyVirtualMemory`, ...), the
//! usual building blocks of bring-your-own-vulnerable-driver attacks.
//!
//! ```no_run
//! use std::path::Path;
//! use drvscan::scanner::{ImportScanner, TargetSet};
//!
//! let scanner = ImportScanner::new(TargetSet::default());
//! let result = scanner.scan(Path::new("RTCore64.sys"))?;
//! for name in &result.matched {
//!     println!("{name}");
//! }
//! # Ok::<(), drvscan::scanner::ScanError>(())
//! ```

pub mod candidates;
pub mod error;
pub mod formats;
pub mod io;
pub mod logging;
pub mod report;
pub mod scanner;

pub use error::{DrvScanError, Result};
pub use scanner::{ImportScanner, ScanResult, TargetSet};
