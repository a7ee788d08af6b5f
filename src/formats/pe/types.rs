//! Core PE data types and structures

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::formats::pe::utils::{section_name_to_string, ByteCursor};

// PE constants
pub const DOS_SIGNATURE: u16 = 0x5A4D; // MZ
pub const PE_SIGNATURE: [u8; 4] = *b"PE\0\0";
pub const PE32_MAGIC: u16 = 0x10B;
pub const PE32PLUS_MAGIC: u16 = 0x20B;

/// Offset of `e_lfanew` inside the DOS header
pub const DOS_E_LFANEW_OFFSET: usize = 0x3C;
/// PE signature (4) + COFF file header (20)
pub const NT_HEADERS_FIXED_SIZE: usize = 24;
pub const COFF_HEADER_SIZE: usize = 20;
pub const SECTION_HEADER_SIZE: usize = 40;
pub const IMPORT_DESCRIPTOR_SIZE: usize = 20;
pub const DATA_DIRECTORY_SIZE: usize = 8;

pub const IMAGE_DIRECTORY_ENTRY_IMPORT: usize = 1;

pub const IMAGE_ORDINAL_FLAG32: u64 = 0x8000_0000;
pub const IMAGE_ORDINAL_FLAG64: u64 = 0x8000_0000_0000_0000;

pub const IMAGE_FILE_MACHINE_I386: u16 = 0x014c;
pub const IMAGE_FILE_MACHINE_AMD64: u16 = 0x8664;

/// PE parsing error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeError {
    #[error("Not a PE file")]
    NotAPEFile,

    #[error("Read of {width} bytes at offset {offset:#x} exceeds buffer of {len} bytes")]
    OutOfBounds {
        offset: usize,
        width: usize,
        len: usize,
    },

    #[error("No string terminator within {max_len} bytes at offset {offset:#x}")]
    UnterminatedString { offset: usize, max_len: usize },

    #[error("Unsupported optional header magic: {0:#06x}")]
    UnsupportedImageType(u16),

    #[error("Import directory RVA {rva:#010x} is not backed by any section")]
    MalformedImportDirectory { rva: u32 },

    #[error("Import table truncated before its sentinel descriptor (offset {offset:#x})")]
    TruncatedImportTable { offset: usize },

    #[error("RVA {rva:#x} is not mapped by any section")]
    NotMapped { rva: u64 },
}

pub type Result<T> = std::result::Result<T, PeError>;

/// Machine types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Machine {
    Unknown,
    I386,   // 0x014c
    X86_64, // 0x8664
    Arm,    // 0x01c0
    Arm64,  // 0xaa64
    ArmNT,  // 0x01c4
    IA64,   // 0x0200
    Other(u16),
}

impl From<u16> for Machine {
    fn from(value: u16) -> Self {
        match value {
            IMAGE_FILE_MACHINE_I386 => Self::I386,
            IMAGE_FILE_MACHINE_AMD64 => Self::X86_64,
            0x01c0 => Self::Arm,
            0xaa64 => Self::Arm64,
            0x01c4 => Self::ArmNT,
            0x0200 => Self::IA64,
            0 => Self::Unknown,
            other => Self::Other(other),
        }
    }
}

/// Image layout selected by the optional header magic.
///
/// Chosen once while parsing headers and then passed to everything that
/// depends on field widths (optional header offsets, thunk size, ordinal
/// flag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Architecture {
    /// PE32, 32-bit fields and 4-byte thunks
    Pe32,
    /// PE32+, 64-bit fields and 8-byte thunks
    Pe32Plus,
}

impl Architecture {
    pub fn from_magic(magic: u16) -> Result<Self> {
        match magic {
            PE32_MAGIC => Ok(Self::Pe32),
            PE32PLUS_MAGIC => Ok(Self::Pe32Plus),
            other => Err(PeError::UnsupportedImageType(other)),
        }
    }

    pub fn magic(self) -> u16 {
        match self {
            Self::Pe32 => PE32_MAGIC,
            Self::Pe32Plus => PE32PLUS_MAGIC,
        }
    }

    pub fn is_64bit(self) -> bool {
        matches!(self, Self::Pe32Plus)
    }

    /// Width of one import lookup / address table entry
    pub fn thunk_size(self) -> usize {
        match self {
            Self::Pe32 => 4,
            Self::Pe32Plus => 8,
        }
    }

    /// High bit marking an import by ordinal
    pub fn ordinal_flag(self) -> u64 {
        match self {
            Self::Pe32 => IMAGE_ORDINAL_FLAG32,
            Self::Pe32Plus => IMAGE_ORDINAL_FLAG64,
        }
    }

    /// Read one thunk at `offset`, widened to u64.
    pub fn read_thunk(self, cursor: &ByteCursor<'_>, offset: usize) -> Result<u64> {
        match self {
            Self::Pe32 => cursor.read_u32(offset).map(u64::from),
            Self::Pe32Plus => cursor.read_u64(offset),
        }
    }

    /// Offset of `NumberOfRvaAndSizes` from the start of the optional header
    pub fn rva_count_offset(self) -> usize {
        match self {
            Self::Pe32 => 92,
            Self::Pe32Plus => 108,
        }
    }

    /// Offset of the data directory array from the start of the optional header
    pub fn data_directories_offset(self) -> usize {
        match self {
            Self::Pe32 => 96,
            Self::Pe32Plus => 112,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pe32 => write!(f, "PE32"),
            Self::Pe32Plus => write!(f, "PE32+"),
        }
    }
}

/// The two DOS header fields the parser relies on
#[derive(Debug, Clone, Copy)]
pub struct DosHeader {
    pub e_magic: u16,  // Magic number (MZ)
    pub e_lfanew: u32, // File address of PE header
}

/// COFF header (20 bytes)
#[derive(Debug, Clone, Copy)]
pub struct CoffHeader {
    pub machine: Machine,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

/// Data directory entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}

impl DataDirectory {
    /// A zero RVA means the directory is absent
    pub fn is_present(&self) -> bool {
        self.virtual_address != 0
    }
}

/// Optional header fields used by the scanner
#[derive(Debug, Clone)]
pub struct OptionalHeader {
    pub architecture: Architecture,
    pub image_base: u64,
    pub number_of_rva_and_sizes: u32,
    pub import_directory: DataDirectory,
}

/// Section header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub characteristics: u32,
}

impl SectionHeader {
    pub fn name(&self) -> String {
        section_name_to_string(&self.name)
    }

    /// Extent of the section in RVA space. Virtual and raw sizes disagree in
    /// plenty of real drivers, so the larger one is taken.
    pub fn mapped_size(&self) -> u32 {
        self.virtual_size.max(self.size_of_raw_data)
    }

    pub fn contains_rva(&self, rva: u32) -> bool {
        let start = u64::from(self.virtual_address);
        let end = start + u64::from(self.mapped_size());
        (start..end).contains(&u64::from(rva))
    }
}

/// Raw import descriptor (IMAGE_IMPORT_DESCRIPTOR)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportDescriptor {
    pub original_first_thunk: u32,
    pub time_date_stamp: u32,
    pub forwarder_chain: u32,
    pub name_rva: u32,
    pub first_thunk: u32,
}

impl ImportDescriptor {
    /// Decode a descriptor from its 20 raw bytes
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let cursor = ByteCursor::new(raw);
        Ok(Self {
            original_first_thunk: cursor.read_u32(0)?,
            time_date_stamp: cursor.read_u32(4)?,
            forwarder_chain: cursor.read_u32(8)?,
            name_rva: cursor.read_u32(12)?,
            first_thunk: cursor.read_u32(16)?,
        })
    }

    /// The all-zero record that terminates the descriptor array
    pub fn is_sentinel(&self) -> bool {
        *self == Self::default()
    }

    /// Lookup table RVA, falling back to the address table when unbound
    /// images leave `OriginalFirstThunk` empty.
    pub fn thunk_rva(&self) -> u32 {
        if self.original_first_thunk != 0 {
            self.original_first_thunk
        } else {
            self.first_thunk
        }
    }
}

/// One imported symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportEntry {
    ByOrdinal(u16),
    ByName { hint: u16, name: String },
}

impl ImportEntry {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::ByName { name, .. } => Some(name),
            Self::ByOrdinal(_) => None,
        }
    }
}

/// Imports resolved for one descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportModule {
    pub dll_name: String,
    pub entries: Vec<ImportEntry>,
    /// Thunks that could not be resolved and were skipped
    pub skipped_entries: usize,
}

/// Parse options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Ceiling for imported symbol names
    pub max_name_len: usize,
    /// Ceiling for imported module (DLL) names
    pub max_module_name_len: usize,
    /// Import records walked per image: one per descriptor plus one per thunk
    pub max_imports: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_name_len: 512,
            max_module_name_len: 256,
            max_imports: 10000,
        }
    }
}
