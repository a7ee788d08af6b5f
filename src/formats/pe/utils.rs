//! Utility functions for PE parsing

use std::borrow::Cow;

use crate::formats::pe::types::{PeError, Result};

/// Bounds-checked little-endian reader over an untrusted image.
///
/// Every read validates `offset + width` against the buffer before touching
/// it; size fields taken from the image are never trusted.
#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    fn out_of_bounds(&self, offset: usize, width: usize) -> PeError {
        PeError::OutOfBounds {
            offset,
            width,
            len: self.data.len(),
        }
    }

    /// Borrow `len` bytes starting at `offset`
    #[inline]
    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| self.out_of_bounds(offset, len))
    }

    #[inline]
    fn read_array<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        let bytes = self.read_bytes(offset, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    #[inline(always)]
    pub fn read_u16(&self, offset: usize) -> Result<u16> {
        self.read_array(offset).map(u16::from_le_bytes)
    }

    #[inline(always)]
    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        self.read_array(offset).map(u32::from_le_bytes)
    }

    #[inline(always)]
    pub fn read_u64(&self, offset: usize) -> Result<u64> {
        self.read_array(offset).map(u64::from_le_bytes)
    }

    /// Read a null-terminated string of at most `max_len` bytes.
    ///
    /// Fails with `UnterminatedString` when no terminator appears within
    /// `max_len` bytes, and with `OutOfBounds` when the buffer ends first.
    /// Non-UTF-8 bytes are replaced rather than rejected.
    pub fn read_cstring(&self, offset: usize, max_len: usize) -> Result<Cow<'a, str>> {
        if offset >= self.data.len() {
            return Err(self.out_of_bounds(offset, 1));
        }

        let end = offset.saturating_add(max_len).min(self.data.len());
        let window = self
            .data
            .get(offset..end)
            .ok_or_else(|| self.out_of_bounds(offset, max_len))?;

        match memchr::memchr(0, window) {
            Some(len) => Ok(String::from_utf8_lossy(&window[..len])),
            None if window.len() < max_len => Err(self.out_of_bounds(offset, max_len)),
            None => Err(PeError::UnterminatedString { offset, max_len }),
        }
    }
}

/// Convert a section name array to a string
pub fn section_name_to_string(name: &[u8; 8]) -> String {
    let end = name.iter().position(|&b| b == 0).unwrap_or(8);
    String::from_utf8_lossy(&name[..end]).to_string()
}

/// Align a value up to the specified alignment
#[inline(always)]
pub fn align_up(value: usize, alignment: usize) -> usize {
    if alignment == 0 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}
