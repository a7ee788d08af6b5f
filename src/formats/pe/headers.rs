//! PE header parsing

use tracing::trace;

use crate::formats::pe::sections::SectionMap;
use crate::formats::pe::types::*;
use crate::formats::pe::utils::ByteCursor;

/// Everything the import walk needs from the headers
#[derive(Debug, Clone)]
pub struct PeHeaders {
    pub dos_header: DosHeader,
    pub coff_header: CoffHeader,
    pub optional_header: OptionalHeader,
    pub section_headers: Vec<SectionHeader>,
}

impl PeHeaders {
    pub fn architecture(&self) -> Architecture {
        self.optional_header.architecture
    }

    pub fn import_directory(&self) -> DataDirectory {
        self.optional_header.import_directory
    }

    /// Build the RVA lookup over the section table in file order
    pub fn section_map(&self) -> SectionMap {
        SectionMap::new(self.section_headers.clone())
    }
}

/// Parse DOS header from data
pub fn parse_dos_header(cursor: &ByteCursor<'_>) -> Result<DosHeader> {
    // Anything too short to carry the magic cannot be a PE image
    let e_magic = cursor.read_u16(0).map_err(|_| PeError::NotAPEFile)?;
    if e_magic != DOS_SIGNATURE {
        return Err(PeError::NotAPEFile);
    }

    let e_lfanew = cursor.read_u32(DOS_E_LFANEW_OFFSET)?;

    // The NT header offset must leave room for signature + COFF header
    let nt_offset = e_lfanew as usize;
    cursor.read_bytes(nt_offset, NT_HEADERS_FIXED_SIZE)?;

    Ok(DosHeader { e_magic, e_lfanew })
}

/// Parse COFF header from data at offset
pub fn parse_coff_header(cursor: &ByteCursor<'_>, offset: usize) -> Result<CoffHeader> {
    cursor.read_bytes(offset, COFF_HEADER_SIZE)?;

    Ok(CoffHeader {
        machine: Machine::from(cursor.read_u16(offset)?),
        number_of_sections: cursor.read_u16(offset + 2)?,
        time_date_stamp: cursor.read_u32(offset + 4)?,
        size_of_optional_header: cursor.read_u16(offset + 16)?,
        characteristics: cursor.read_u16(offset + 18)?,
    })
}

/// Parse the optional header fields the scanner cares about.
///
/// `size` is the declared `SizeOfOptionalHeader`. The import data directory is
/// only read when both `NumberOfRvaAndSizes` and the declared size cover it;
/// otherwise the image is treated as having no imports.
pub fn parse_optional_header(
    cursor: &ByteCursor<'_>,
    offset: usize,
    size: u16,
) -> Result<OptionalHeader> {
    let magic = cursor.read_u16(offset)?;
    let architecture = Architecture::from_magic(magic)?;
    let declared_end = offset + size as usize;

    let image_base = match architecture {
        Architecture::Pe32 => cursor.read_u32(offset + 28).map(u64::from)?,
        Architecture::Pe32Plus => cursor.read_u64(offset + 24)?,
    };

    let count_offset = offset + architecture.rva_count_offset();
    let number_of_rva_and_sizes = if count_offset + 4 <= declared_end {
        cursor.read_u32(count_offset)?
    } else {
        0
    };

    let entry_offset = offset
        + architecture.data_directories_offset()
        + IMAGE_DIRECTORY_ENTRY_IMPORT * DATA_DIRECTORY_SIZE;
    let import_directory = if (number_of_rva_and_sizes as usize) > IMAGE_DIRECTORY_ENTRY_IMPORT
        && entry_offset + DATA_DIRECTORY_SIZE <= declared_end
    {
        DataDirectory {
            virtual_address: cursor.read_u32(entry_offset)?,
            size: cursor.read_u32(entry_offset + 4)?,
        }
    } else {
        DataDirectory::default()
    };

    Ok(OptionalHeader {
        architecture,
        image_base,
        number_of_rva_and_sizes,
        import_directory,
    })
}

/// Parse section headers from data
pub fn parse_section_headers(
    cursor: &ByteCursor<'_>,
    offset: usize,
    count: u16,
) -> Result<Vec<SectionHeader>> {
    let mut sections = Vec::with_capacity(count as usize);

    for i in 0..count as usize {
        let section_offset = offset + i * SECTION_HEADER_SIZE;
        let raw = cursor.read_bytes(section_offset, SECTION_HEADER_SIZE)?;

        let mut name = [0u8; 8];
        name.copy_from_slice(&raw[..8]);

        sections.push(SectionHeader {
            name,
            virtual_size: cursor.read_u32(section_offset + 8)?,
            virtual_address: cursor.read_u32(section_offset + 12)?,
            size_of_raw_data: cursor.read_u32(section_offset + 16)?,
            pointer_to_raw_data: cursor.read_u32(section_offset + 20)?,
            characteristics: cursor.read_u32(section_offset + 36)?,
        });
    }

    Ok(sections)
}

/// Parse DOS, NT and section headers of an image
pub fn parse_headers(data: &[u8]) -> Result<PeHeaders> {
    let cursor = ByteCursor::new(data);

    let dos_header = parse_dos_header(&cursor)?;
    let nt_offset = dos_header.e_lfanew as usize;

    let signature = cursor.read_bytes(nt_offset, PE_SIGNATURE.len())?;
    if signature != PE_SIGNATURE {
        return Err(PeError::NotAPEFile);
    }

    let coff_header = parse_coff_header(&cursor, nt_offset + PE_SIGNATURE.len())?;

    let optional_offset = nt_offset + NT_HEADERS_FIXED_SIZE;
    let optional_header =
        parse_optional_header(&cursor, optional_offset, coff_header.size_of_optional_header)?;

    // Sections follow the declared optional header size, not the layout size
    let section_offset = optional_offset + coff_header.size_of_optional_header as usize;
    let section_headers =
        parse_section_headers(&cursor, section_offset, coff_header.number_of_sections)?;

    trace!(
        architecture = %optional_header.architecture,
        sections = section_headers.len(),
        import_rva = optional_header.import_directory.virtual_address,
        "Parsed PE headers"
    );

    Ok(PeHeaders {
        dos_header,
        coff_header,
        optional_header,
        section_headers,
    })
}
