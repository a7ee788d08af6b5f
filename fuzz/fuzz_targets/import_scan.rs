#![no_main]
use libfuzzer_sys::fuzz_target;
use std::path::Path;

use drvscan::scanner::{ImportScanner, TargetSet};

fuzz_target!(|data: &[u8]| {
    let scanner = ImportScanner::new(TargetSet::default());
    let _ = scanner.scan_bytes(Path::new("<fuzz>"), data);
});
