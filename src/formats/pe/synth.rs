//! Minimal PE image synthesis.
//!
//! Emits small, structurally valid PE32 / PE32+ images with one `.idata`
//! section that holds an import table. Tests and benches use it through the
//! `synth` feature; scanning real drivers never does.
//!
//! Offsets are computed with plain arithmetic and casts, so specs large
//! enough to push the section past 4 GiB panic or produce garbage.
//!
//! Layout of a built image:
//!
//! ```text
//! 0x000  DOS header, e_lfanew = 0x80
//! 0x080  "PE\0\0", COFF header, optional header, one section header
//! 0x200  .idata (RVA 0x1000): descriptors + sentinel, per-module lookup and
//!        address tables, hint/name entries, DLL names
//! ```

use crate::formats::pe::types::*;
use crate::formats::pe::utils::align_up;

/// RVA of the `.idata` section
pub const SECTION_RVA: u32 = 0x1000;
/// File offset of the `.idata` section
pub const SECTION_FILE_OFFSET: usize = 0x200;

const NT_HEADERS_OFFSET: usize = 0x80;
const FILE_ALIGNMENT: usize = 0x200;
const DATA_DIRECTORY_COUNT: usize = 16;
const IMAGE_SUBSYSTEM_NATIVE: u16 = 1;
const IMAGE_FILE_EXECUTABLE_IMAGE: u16 = 0x0002;
const IDATA_CHARACTERISTICS: u32 = 0xC000_0040;

/// One lookup table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thunk {
    Name(String),
    Ordinal(u16),
    /// Written verbatim, for corrupt-entry cases
    Raw(u64),
}

/// One import descriptor and its thunks
#[derive(Debug, Clone)]
pub struct ModuleSpec {
    dll: String,
    thunks: Vec<Thunk>,
    lookup_table: bool,
    name_rva: Option<u32>,
}

impl ModuleSpec {
    pub fn new(dll: impl Into<String>) -> Self {
        Self {
            dll: dll.into(),
            thunks: Vec::new(),
            lookup_table: true,
            name_rva: None,
        }
    }

    pub fn import(mut self, name: impl Into<String>) -> Self {
        self.thunks.push(Thunk::Name(name.into()));
        self
    }

    pub fn ordinal(mut self, ordinal: u16) -> Self {
        self.thunks.push(Thunk::Ordinal(ordinal));
        self
    }

    pub fn raw_thunk(mut self, value: u64) -> Self {
        self.thunks.push(Thunk::Raw(value));
        self
    }

    /// Leave `OriginalFirstThunk` zero so only the address table is present
    pub fn without_lookup_table(mut self) -> Self {
        self.lookup_table = false;
        self
    }

    /// Override the descriptor's DLL name RVA
    pub fn name_rva(mut self, rva: u32) -> Self {
        self.name_rva = Some(rva);
        self
    }
}

/// Section-relative offsets computed for one module
struct ModuleLayout {
    lookup_table: usize,
    address_table: usize,
    /// Hint/name entry per thunk, `None` for ordinals and raw values
    hint_names: Vec<Option<usize>>,
    dll_name: usize,
}

/// Builder for synthetic images
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    architecture: Architecture,
    modules: Vec<ModuleSpec>,
    import_directory: bool,
    import_directory_rva: Option<u32>,
    shared_descriptors: usize,
}

impl ImageBuilder {
    pub fn new(architecture: Architecture) -> Self {
        Self {
            architecture,
            modules: Vec::new(),
            import_directory: true,
            import_directory_rva: None,
            shared_descriptors: 0,
        }
    }

    pub fn module(mut self, module: ModuleSpec) -> Self {
        self.modules.push(module);
        self
    }

    /// Zero the import data directory entry
    pub fn without_import_directory(mut self) -> Self {
        self.import_directory = false;
        self
    }

    /// Point the import data directory somewhere else
    pub fn import_directory_rva(mut self, rva: u32) -> Self {
        self.import_directory_rva = Some(rva);
        self
    }

    /// Append `count` descriptors that reuse the first module's name and
    /// thunk tables
    pub fn shared_descriptors(mut self, count: usize) -> Self {
        self.shared_descriptors = count;
        self
    }

    /// File offset of the first import descriptor
    pub fn descriptor_table_offset(&self) -> usize {
        SECTION_FILE_OFFSET
    }

    /// File offset just past the sentinel descriptor
    pub fn descriptor_table_end(&self) -> usize {
        SECTION_FILE_OFFSET + self.descriptor_table_len()
    }

    fn descriptor_table_len(&self) -> usize {
        (self.descriptor_count() + 1) * IMPORT_DESCRIPTOR_SIZE
    }

    fn descriptor_count(&self) -> usize {
        if self.modules.is_empty() {
            0
        } else {
            self.modules.len() + self.shared_descriptors
        }
    }

    fn optional_header_size(&self) -> usize {
        self.architecture.data_directories_offset() + DATA_DIRECTORY_COUNT * DATA_DIRECTORY_SIZE
    }

    fn layout(&self) -> (Vec<ModuleLayout>, usize) {
        let thunk_size = self.architecture.thunk_size();
        let mut pos = self.descriptor_table_len();

        let mut layouts: Vec<ModuleLayout> = self
            .modules
            .iter()
            .map(|module| {
                let table_len = (module.thunks.len() + 1) * thunk_size;
                let lookup_table = pos;
                let address_table = pos + table_len;
                pos += 2 * table_len;
                ModuleLayout {
                    lookup_table,
                    address_table,
                    hint_names: Vec::with_capacity(module.thunks.len()),
                    dll_name: 0,
                }
            })
            .collect();

        for (module, layout) in self.modules.iter().zip(layouts.iter_mut()) {
            for thunk in &module.thunks {
                match thunk {
                    Thunk::Name(name) => {
                        layout.hint_names.push(Some(pos));
                        // Hint/name entries are word aligned
                        pos = align_up(pos + 2 + name.len() + 1, 2);
                    }
                    Thunk::Ordinal(_) | Thunk::Raw(_) => layout.hint_names.push(None),
                }
            }
            layout.dll_name = pos;
            pos += module.dll.len() + 1;
        }

        (layouts, pos)
    }

    fn build_section(&self) -> Vec<u8> {
        let (layouts, used) = self.layout();
        let thunk_size = self.architecture.thunk_size();
        let mut section = vec![0u8; align_up(used, FILE_ALIGNMENT).max(FILE_ALIGNMENT)];
        let rva = |offset: usize| SECTION_RVA + offset as u32;

        for (index, (module, layout)) in self.modules.iter().zip(&layouts).enumerate() {
            let descriptor = index * IMPORT_DESCRIPTOR_SIZE;
            let original_first_thunk = if module.lookup_table {
                rva(layout.lookup_table)
            } else {
                0
            };
            put_u32(&mut section, descriptor, original_first_thunk);
            put_u32(
                &mut section,
                descriptor + 12,
                module.name_rva.unwrap_or_else(|| rva(layout.dll_name)),
            );
            put_u32(&mut section, descriptor + 16, rva(layout.address_table));

            for (slot, (thunk, hint_name)) in module.thunks.iter().zip(&layout.hint_names).enumerate() {
                let value = match (thunk, hint_name) {
                    (Thunk::Name(name), Some(entry)) => {
                        put_u16(&mut section, *entry, slot as u16);
                        section[entry + 2..entry + 2 + name.len()].copy_from_slice(name.as_bytes());
                        u64::from(rva(*entry))
                    }
                    (Thunk::Ordinal(ordinal), _) => {
                        self.architecture.ordinal_flag() | u64::from(*ordinal)
                    }
                    (Thunk::Raw(value), _) => *value,
                    (Thunk::Name(_), None) => 0,
                };

                let delta = slot * thunk_size;
                self.put_thunk(&mut section, layout.lookup_table + delta, value);
                self.put_thunk(&mut section, layout.address_table + delta, value);
            }

            section[layout.dll_name..layout.dll_name + module.dll.len()]
                .copy_from_slice(module.dll.as_bytes());
        }

        for index in self.modules.len()..self.descriptor_count() {
            section.copy_within(0..IMPORT_DESCRIPTOR_SIZE, index * IMPORT_DESCRIPTOR_SIZE);
        }

        section
    }

    fn put_thunk(&self, buf: &mut [u8], offset: usize, value: u64) {
        match self.architecture {
            Architecture::Pe32 => put_u32(buf, offset, value as u32),
            Architecture::Pe32Plus => put_u64(buf, offset, value),
        }
    }

    /// Produce the image bytes
    pub fn build(&self) -> Vec<u8> {
        let section = self.build_section();
        let mut image = vec![0u8; SECTION_FILE_OFFSET + section.len()];

        // DOS header
        put_u16(&mut image, 0, DOS_SIGNATURE);
        put_u32(&mut image, DOS_E_LFANEW_OFFSET, NT_HEADERS_OFFSET as u32);

        // NT signature + COFF header
        image[NT_HEADERS_OFFSET..NT_HEADERS_OFFSET + 4].copy_from_slice(&PE_SIGNATURE);
        let coff = NT_HEADERS_OFFSET + 4;
        let machine = match self.architecture {
            Architecture::Pe32 => IMAGE_FILE_MACHINE_I386,
            Architecture::Pe32Plus => IMAGE_FILE_MACHINE_AMD64,
        };
        let optional_size = self.optional_header_size();
        put_u16(&mut image, coff, machine);
        put_u16(&mut image, coff + 2, 1);
        put_u16(&mut image, coff + 16, optional_size as u16);
        put_u16(&mut image, coff + 18, IMAGE_FILE_EXECUTABLE_IMAGE);

        // Optional header
        let optional = NT_HEADERS_OFFSET + NT_HEADERS_FIXED_SIZE;
        put_u16(&mut image, optional, self.architecture.magic());
        match self.architecture {
            Architecture::Pe32 => put_u32(&mut image, optional + 28, 0x0001_0000),
            Architecture::Pe32Plus => put_u64(&mut image, optional + 24, 0x1_4000_0000),
        }
        put_u32(&mut image, optional + 32, 0x1000); // SectionAlignment
        put_u32(&mut image, optional + 36, FILE_ALIGNMENT as u32);
        put_u32(&mut image, optional + 56, SECTION_RVA + section.len() as u32); // SizeOfImage
        put_u32(&mut image, optional + 60, SECTION_FILE_OFFSET as u32); // SizeOfHeaders
        put_u16(&mut image, optional + 68, IMAGE_SUBSYSTEM_NATIVE);
        put_u32(
            &mut image,
            optional + self.architecture.rva_count_offset(),
            DATA_DIRECTORY_COUNT as u32,
        );

        if self.import_directory {
            let entry = optional
                + self.architecture.data_directories_offset()
                + IMAGE_DIRECTORY_ENTRY_IMPORT * DATA_DIRECTORY_SIZE;
            put_u32(
                &mut image,
                entry,
                self.import_directory_rva.unwrap_or(SECTION_RVA),
            );
            put_u32(&mut image, entry + 4, self.descriptor_table_len() as u32);
        }

        // Section header
        let header = optional + optional_size;
        image[header..header + 6].copy_from_slice(b".idata");
        put_u32(&mut image, header + 8, section.len() as u32);
        put_u32(&mut image, header + 12, SECTION_RVA);
        put_u32(&mut image, header + 16, section.len() as u32);
        put_u32(&mut image, header + 20, SECTION_FILE_OFFSET as u32);
        put_u32(&mut image, header + 36, IDATA_CHARACTERISTICS);

        image[SECTION_FILE_OFFSET..].copy_from_slice(&section);
        image
    }
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}
