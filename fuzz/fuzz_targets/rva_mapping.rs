#![no_main]
use libfuzzer_sys::fuzz_target;

use drvscan::formats::pe::PeImage;

fuzz_target!(|data: &[u8]| {
    let Some((rva, image)) = data.split_first_chunk::<4>() else {
        return;
    };
    if let Ok(pe) = PeImage::new(image) {
        let rva = u32::from_le_bytes(*rva);
        // Lookups must be stable for the same input
        assert_eq!(pe.rva_to_offset(rva), pe.rva_to_offset(rva));
    }
});
