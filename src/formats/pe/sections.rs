//! Section management for PE files

use crate::formats::pe::types::*;

/// RVA to file offset translation over a section table.
///
/// Sections are kept in the order the image lists them. Lookups scan that
/// order and the first section covering an RVA wins, so overlapping or
/// unsorted tables resolve the same way every time.
#[derive(Debug, Clone, Default)]
pub struct SectionMap {
    sections: Vec<SectionHeader>,
}

impl SectionMap {
    /// Create a new section map
    pub fn new(sections: Vec<SectionHeader>) -> Self {
        Self { sections }
    }

    /// Get all sections
    pub fn sections(&self) -> &[SectionHeader] {
        &self.sections
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Find section by name
    pub fn section_by_name(&self, name: &str) -> Option<&SectionHeader> {
        self.sections.iter().find(|s| s.name() == name)
    }

    /// Find the first section containing RVA
    pub fn section_containing_rva(&self, rva: u32) -> Option<&SectionHeader> {
        self.sections.iter().find(|s| s.contains_rva(rva))
    }

    /// Convert RVA to file offset
    #[inline]
    pub fn rva_to_offset(&self, rva: u32) -> Result<usize> {
        let section = self
            .section_containing_rva(rva)
            .ok_or(PeError::NotMapped {
                rva: u64::from(rva),
            })?;

        let delta = (rva - section.virtual_address) as usize;
        Ok((section.pointer_to_raw_data as usize).saturating_add(delta))
    }
}
