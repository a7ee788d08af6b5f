//! Single-image scans through the public API.

use std::collections::BTreeSet;
use std::path::Path;

use drvscan::formats::pe::synth::{ImageBuilder, ModuleSpec};
use drvscan::formats::pe::{Architecture, ParseOptions, PeError, PeImage};
use drvscan::io::error::IoError;
use drvscan::io::IOLimits;
use drvscan::scanner::config::ScanConfig;
use drvscan::scanner::{ImportScanner, ScanFailure, TargetSet};

use crate::common::{driver_image, write_file};

fn names(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_matched_subset_of_module_imports() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "a.sys",
        &driver_image(
            Architecture::Pe32Plus,
            &[("ntoskrnl.exe", &["MmCopyVirtualMemory", "MmGetPhysicalAddress"])],
        ),
    );

    let scanner = ImportScanner::new(TargetSet::new(["MmCopyVirtualMemory"]));
    let result = scanner.scan(&path).unwrap();
    assert_eq!(result.matched, names(&["MmCopyVirtualMemory"]));
}

#[test]
fn test_layouts_resolve_the_same_names() {
    let modules: &[(&str, &[&str])] = &[
        ("ntoskrnl.exe", &["MmMapIoSpace", "IoCreateDevice", "ZwOpenSection"]),
        ("HAL.dll", &["HalGetBusDataByOffset", "MmMapIoSpace"]),
    ];
    let narrow = driver_image(Architecture::Pe32, modules);
    let wide = driver_image(Architecture::Pe32Plus, modules);

    let narrow_names = PeImage::new(&narrow).unwrap().imported_names().unwrap().len();
    let wide_image = PeImage::new(&wide).unwrap();
    assert_eq!(wide_image.imported_names().unwrap().len(), narrow_names);

    let scanner = ImportScanner::new(TargetSet::default());
    let a = scanner.scan_bytes(Path::new("x86.sys"), &narrow).unwrap();
    let b = scanner.scan_bytes(Path::new("x64.sys"), &wide).unwrap();
    assert_eq!(a.matched, b.matched);
    assert_eq!(a.matched, names(&["MmMapIoSpace", "ZwOpenSection"]));
    assert_eq!(a.architecture, Architecture::Pe32);
    assert_eq!(b.architecture, Architecture::Pe32Plus);
}

#[test]
fn test_n_by_m_distinct_names() {
    for arch in [Architecture::Pe32, Architecture::Pe32Plus] {
        let mut builder = ImageBuilder::new(arch);
        for n in 0..5 {
            let mut module = ModuleSpec::new(format!("dep{n}.sys"));
            for m in 0..7 {
                module = module.import(format!("Dep{n}Routine{m}"));
            }
            builder = builder.module(module);
        }
        let data = builder.build();

        let image = PeImage::new(&data).unwrap();
        assert_eq!(image.imported_names().unwrap().len(), 35);
    }
}

#[test]
fn test_no_import_directory_is_clean() {
    let data = ImageBuilder::new(Architecture::Pe32Plus)
        .module(ModuleSpec::new("ntoskrnl.exe").import("MmMapIoSpace"))
        .without_import_directory()
        .build();

    let result = ImportScanner::new(TargetSet::default())
        .scan_bytes(Path::new("noimp.sys"), &data)
        .unwrap();
    assert!(result.matched.is_empty());
    assert_eq!(result.imported_count, 0);
}

#[test]
fn test_ordinals_never_match() {
    let data = ImageBuilder::new(Architecture::Pe32Plus)
        .module(
            ModuleSpec::new("ntoskrnl.exe")
                .ordinal(0x1234)
                .import("IoCreateDevice")
                .ordinal(7),
        )
        .build();

    let targets = TargetSet::new(["4660", "7", "#7", "IoDeleteDevice"]);
    let result = ImportScanner::new(targets)
        .scan_bytes(Path::new("ord.sys"), &data)
        .unwrap();
    assert!(result.matched.is_empty());
    assert_eq!(result.imported_count, 1);
}

#[test]
fn test_truncation_before_sentinel_is_an_error() {
    let builder = ImageBuilder::new(Architecture::Pe32)
        .module(ModuleSpec::new("ntoskrnl.exe").import("MmMapIoSpace"))
        .module(ModuleSpec::new("HAL.dll").import("HalTranslateBusAddress"))
        .module(ModuleSpec::new("WDFLDR.SYS").import("WdfVersionBind"));
    let data = builder.build();
    let scanner = ImportScanner::new(TargetSet::default());

    for cut in builder.descriptor_table_offset()..builder.descriptor_table_end() {
        let err = scanner
            .scan_bytes(Path::new("cut.sys"), &data[..cut])
            .unwrap_err();
        assert!(
            matches!(err.cause, ScanFailure::Pe(PeError::TruncatedImportTable { .. })),
            "cut at {cut:#x}: {err}"
        );
    }
}

#[test]
fn test_arbitrary_bytes_are_not_pe() {
    let scanner = ImportScanner::new(TargetSet::default());
    let inputs: [&[u8]; 5] = [b"", b"M", b"MZ", b"\x7fELF\x02\x01\x01\x00", &[0xCC; 512]];
    for data in inputs {
        let err = scanner.scan_bytes(Path::new("junk.sys"), data).unwrap_err();
        assert!(
            matches!(
                err.cause,
                ScanFailure::Pe(PeError::NotAPEFile | PeError::OutOfBounds { .. })
            ),
            "{data:?} gave {err}"
        );
    }
}

#[test]
fn test_oversized_file_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "big.sys",
        &driver_image(Architecture::Pe32Plus, &[("ntoskrnl.exe", &["MmMapIoSpace"])]),
    );

    let scanner = ImportScanner::with_limits(
        TargetSet::default(),
        IOLimits { max_file_size: 256 },
        Default::default(),
    );
    let err = scanner.scan(&path).unwrap_err();
    assert_eq!(err.path, path);
    assert!(matches!(err.cause, ScanFailure::Io(IoError::FileTooLarge { limit: 256, .. })));
}

#[test]
fn test_corrupt_descriptor_does_not_hide_others() {
    let data = ImageBuilder::new(Architecture::Pe32Plus)
        .module(ModuleSpec::new("gone.sys").import("Hidden").name_rva(0x00BA_D000))
        .module(
            ModuleSpec::new("ntoskrnl.exe")
                .import("MmMapIoSpace")
                .raw_thunk(0x0FFF_0000)
                .import("MmCopyVirtualMemory"),
        )
        .build();

    let result = ImportScanner::new(TargetSet::default())
        .scan_bytes(Path::new("partial.sys"), &data)
        .unwrap();
    assert_eq!(result.matched, names(&["MmCopyVirtualMemory", "MmMapIoSpace"]));
}

#[test]
fn test_shared_thunk_arrays_are_capped() {
    let filler = "F".repeat(500);
    let mut module = ModuleSpec::new("ntoskrnl.exe").import("MmMapIoSpace");
    for _ in 0..2000 {
        module = module.import(filler.clone());
    }
    let data = ImageBuilder::new(Architecture::Pe32)
        .module(module)
        .shared_descriptors(199)
        .build();

    let config = ScanConfig {
        parse: ParseOptions {
            max_imports: 5000,
            ..ParseOptions::default()
        },
        ..ScanConfig::default()
    };
    let result = ImportScanner::from_config(&config)
        .scan_bytes(Path::new("shared.sys"), &data)
        .unwrap();
    assert_eq!(result.matched, names(&["MmMapIoSpace"]));
    assert_eq!(result.imported_count, 2);

    let image = PeImage::with_options(&data, config.parse.clone()).unwrap();
    let table = image.imports().unwrap();
    assert!(table.count() < 5000);
    assert_eq!(table.modules.len(), 3);
    assert_eq!(table.limited_modules, 198);
}
