//! PE image parsing, limited to what an import scan needs.
//!
//! [`PeImage`] validates the headers up front and walks the import
//! directory lazily on first use.

use std::cell::OnceCell;
use std::collections::BTreeSet;

pub mod directories;
pub mod headers;
pub mod sections;
#[cfg(any(test, feature = "synth"))]
pub mod synth;
pub mod types;
pub mod utils;

use directories::*;
use headers::*;
use sections::*;
pub use types::*;

/// Parsed view over a PE image
pub struct PeImage<'data> {
    data: &'data [u8],
    headers: PeHeaders,
    section_map: SectionMap,
    options: ParseOptions,

    // Lazy-loaded data
    imports: OnceCell<ImportTable>,
}

impl<'data> PeImage<'data> {
    /// Parse with default options
    pub fn new(data: &'data [u8]) -> Result<Self> {
        Self::with_options(data, ParseOptions::default())
    }

    /// Parse with custom options
    pub fn with_options(data: &'data [u8], options: ParseOptions) -> Result<Self> {
        let headers = parse_headers(data)?;
        let section_map = headers.section_map();

        Ok(Self {
            data,
            headers,
            section_map,
            options,
            imports: OnceCell::new(),
        })
    }

    pub fn headers(&self) -> &PeHeaders {
        &self.headers
    }

    /// Layout chosen by the optional header magic
    pub fn architecture(&self) -> Architecture {
        self.headers.architecture()
    }

    pub fn is_64bit(&self) -> bool {
        self.architecture().is_64bit()
    }

    /// Get machine type
    pub fn machine(&self) -> Machine {
        self.headers.coff_header.machine
    }

    pub fn image_base(&self) -> u64 {
        self.headers.optional_header.image_base
    }

    pub fn import_directory(&self) -> DataDirectory {
        self.headers.import_directory()
    }

    /// Get all sections in file order
    pub fn sections(&self) -> &[SectionHeader] {
        self.section_map.sections()
    }

    /// Convert RVA to file offset
    pub fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        self.section_map.rva_to_offset(rva)
    }

    /// Get imports (lazy-loaded)
    pub fn imports(&self) -> Result<&ImportTable> {
        if let Some(imports) = self.imports.get() {
            return Ok(imports);
        }

        let imports = parse_imports(
            self.data,
            &self.section_map,
            &self.import_directory(),
            self.architecture(),
            &self.options,
        )?;

        Ok(self.imports.get_or_init(|| imports))
    }

    /// Distinct by-name imports of the image
    pub fn imported_names(&self) -> Result<BTreeSet<&str>> {
        Ok(self.imports()?.names())
    }
}
