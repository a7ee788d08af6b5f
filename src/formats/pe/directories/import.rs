//! Import table parsing

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::formats::pe::sections::SectionMap;
use crate::formats::pe::types::*;
use crate::formats::pe::utils::ByteCursor;

/// Import table containing all resolved imports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportTable {
    pub modules: Vec<ImportModule>,
    /// Descriptors whose name or thunk table could not be read
    pub skipped_modules: usize,
    /// Descriptors cut short or left unwalked once `max_imports` was reached
    pub limited_modules: usize,
}

impl ImportTable {
    /// Get total import count, ordinals included
    pub fn count(&self) -> usize {
        self.modules.iter().map(|m| m.entries.len()).sum()
    }

    /// Number of imports by ordinal
    pub fn ordinal_count(&self) -> usize {
        self.entries()
            .filter(|e| matches!(e, ImportEntry::ByOrdinal(_)))
            .count()
    }

    /// Number of thunks skipped across all modules
    pub fn skipped_entries(&self) -> usize {
        self.modules.iter().map(|m| m.skipped_entries).sum()
    }

    /// Whether the walk stopped early at the import limit
    pub fn is_limited(&self) -> bool {
        self.limited_modules > 0
    }

    fn entries(&self) -> impl Iterator<Item = &ImportEntry> {
        self.modules.iter().flat_map(|m| m.entries.iter())
    }

    /// Distinct by-name imports across every module
    pub fn names(&self) -> BTreeSet<&str> {
        self.entries().filter_map(ImportEntry::name).collect()
    }

    /// Get all DLL names
    pub fn dll_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.dll_name.as_str()).collect()
    }

    /// Check if an import exists by name
    pub fn has_import(&self, name: &str) -> bool {
        self.entries().any(|e| e.name() == Some(name))
    }
}

/// Walk the import directory of an image.
///
/// The descriptor array must end with an all-zero sentinel; running out of
/// data first is an error. A descriptor whose name or thunk table cannot be
/// read is skipped, and so is a single thunk whose hint/name entry cannot be
/// read, so one corrupt record does not hide the rest of the table.
///
/// At most `options.max_imports` records are resolved. Descriptors may share
/// thunk arrays, so without the cap a small file can expand into a very large
/// table. Past the cap the remaining descriptors are still checked for the
/// sentinel but not resolved.
pub fn parse_imports(
    data: &[u8],
    sections: &SectionMap,
    import_dir: &DataDirectory,
    architecture: Architecture,
    options: &ParseOptions,
) -> Result<ImportTable> {
    let mut table = ImportTable::default();

    if !import_dir.is_present() {
        return Ok(table);
    }

    let dir_rva = import_dir.virtual_address;
    let mut offset = sections
        .rva_to_offset(dir_rva)
        .map_err(|_| PeError::MalformedImportDirectory { rva: dir_rva })?;

    let cursor = ByteCursor::new(data);
    let mut budget = options.max_imports;

    loop {
        let raw = cursor
            .read_bytes(offset, IMPORT_DESCRIPTOR_SIZE)
            .map_err(|_| PeError::TruncatedImportTable { offset })?;
        let descriptor = ImportDescriptor::parse(raw)?;

        if descriptor.is_sentinel() {
            break;
        }

        if budget == 0 {
            table.limited_modules += 1;
        } else {
            budget -= 1;
            let module = parse_module(
                &cursor,
                sections,
                &descriptor,
                architecture,
                options,
                &mut budget,
            );
            match module {
                Ok((module, limited)) => {
                    if limited {
                        table.limited_modules += 1;
                    }
                    table.modules.push(module);
                }
                Err(err) => {
                    warn!(
                        descriptor_offset = offset,
                        name_rva = descriptor.name_rva,
                        thunk_rva = descriptor.thunk_rva(),
                        error = %err,
                        "Skipping unreadable import descriptor"
                    );
                    table.skipped_modules += 1;
                }
            }
        }

        offset = offset
            .checked_add(IMPORT_DESCRIPTOR_SIZE)
            .ok_or(PeError::TruncatedImportTable { offset })?;
    }

    if table.is_limited() {
        warn!(
            max_imports = options.max_imports,
            limited_modules = table.limited_modules,
            resolved = table.count(),
            "Import limit reached, remaining thunks not walked"
        );
    }

    Ok(table)
}

/// Resolve one descriptor, spending `budget` per thunk. The flag is set when
/// the budget ran out before the thunk terminator.
fn parse_module(
    cursor: &ByteCursor<'_>,
    sections: &SectionMap,
    descriptor: &ImportDescriptor,
    architecture: Architecture,
    options: &ParseOptions,
    budget: &mut usize,
) -> Result<(ImportModule, bool)> {
    let name_offset = sections.rva_to_offset(descriptor.name_rva)?;
    let dll_name = cursor
        .read_cstring(name_offset, options.max_module_name_len)?
        .into_owned();

    let mut module = ImportModule {
        dll_name,
        entries: Vec::new(),
        skipped_entries: 0,
    };

    let thunk_rva = descriptor.thunk_rva();
    if thunk_rva == 0 {
        return Ok((module, false));
    }

    let entry_size = architecture.thunk_size();
    let mut thunk_offset = sections.rva_to_offset(thunk_rva)?;

    loop {
        let value = match architecture.read_thunk(cursor, thunk_offset) {
            Ok(value) => value,
            Err(err) => {
                // Array runs off the end of the file; keep what was read
                debug!(
                    dll = %module.dll_name,
                    thunk_offset,
                    error = %err,
                    "Thunk array ends without terminator"
                );
                module.skipped_entries += 1;
                break;
            }
        };
        if value == 0 {
            break;
        }
        if *budget == 0 {
            return Ok((module, true));
        }
        *budget -= 1;

        match resolve_thunk(cursor, sections, value, architecture, options) {
            Ok(entry) => module.entries.push(entry),
            Err(err) => {
                debug!(
                    dll = %module.dll_name,
                    thunk_offset,
                    thunk = value,
                    error = %err,
                    "Skipping unresolvable import thunk"
                );
                module.skipped_entries += 1;
            }
        }

        match thunk_offset.checked_add(entry_size) {
            Some(next) => thunk_offset = next,
            None => {
                module.skipped_entries += 1;
                break;
            }
        }
    }

    Ok((module, false))
}

fn resolve_thunk(
    cursor: &ByteCursor<'_>,
    sections: &SectionMap,
    value: u64,
    architecture: Architecture,
    options: &ParseOptions,
) -> Result<ImportEntry> {
    let ordinal_flag = architecture.ordinal_flag();
    if value & ordinal_flag != 0 {
        return Ok(ImportEntry::ByOrdinal((value & 0xFFFF) as u16));
    }

    let hint_name_rva = value & !ordinal_flag;
    let rva = u32::try_from(hint_name_rva)
        .map_err(|_| PeError::NotMapped { rva: hint_name_rva })?;
    let hint_offset = sections.rva_to_offset(rva)?;

    let hint = cursor.read_u16(hint_offset)?;
    let name = cursor
        .read_cstring(hint_offset.saturating_add(2), options.max_name_len)?
        .into_owned();

    Ok(ImportEntry::ByName { hint, name })
}
