//! Column segments of a tag store file.
//!
//! A tag store file is never mapped as a whole. Each logical column gets its
//! own read-only mapping addressed by `(offset, length)`, so no single view
//! has to cover a multi-gigabyte file.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  count: u64                        (8 bytes)  │
//! ├──────────────────────────────────────────────┤
//! │  ids: u64 × n                     (n × 8)     │
//! ├──────────────────────────────────────────────┤
//! │  key offsets: u32 × (n + 1)       ((n+1) × 4) │
//! ├──────────────────────────────────────────────┤
//! │  value offsets: u32 × (n + 1)     ((n+1) × 4) │
//! ├──────────────────────────────────────────────┤
//! │  keys blob                 (key_offsets[n])   │
//! ├──────────────────────────────────────────────┤
//! │  values blob                  (rest of file)  │
//! └──────────────────────────────────────────────┘
//! ```

use crate::error::{GeodexError, Result};
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::ops::Range;
use tracing::debug;

/// Size of the triplet count header.
pub const TAG_HEADER_SIZE: u64 = 8;

/// Width of one id entry.
pub const ID_WIDTH: u64 = 8;

/// Width of one offset entry.
pub const OFFSET_WIDTH: u64 = 4;

/// Byte ranges of the five column segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagLayout {
    /// Number of triplets.
    pub count: u64,
    /// Id column.
    pub ids: Range<u64>,
    /// Key offset column (`count + 1` entries).
    pub key_offsets: Range<u64>,
    /// Value offset column (`count + 1` entries).
    pub value_offsets: Range<u64>,
    /// Concatenated UTF-8 keys.
    pub keys_blob: Range<u64>,
    /// Concatenated UTF-8 values.
    pub values_blob: Range<u64>,
}

impl TagLayout {
    /// Returns the file position of the final key offset entry, which holds
    /// the keys blob length.
    ///
    /// # Errors
    ///
    /// Returns `GeodexError::InvalidLayout` if the id and key offset columns
    /// do not fit the file.
    pub fn keys_blob_len_position(count: u64, file_len: u64) -> Result<u64> {
        let ids = section("ids", TAG_HEADER_SIZE, count, ID_WIDTH, file_len)?;
        let entries = offset_entries(count, ids.end, file_len)?;
        let key_offsets = section("key offsets", ids.end, entries, OFFSET_WIDTH, file_len)?;
        Ok(key_offsets.end - OFFSET_WIDTH)
    }

    /// Computes all five ranges from the header count and the keys blob length.
    ///
    /// # Errors
    ///
    /// Returns `GeodexError::InvalidLayout` if any range overflows or extends
    /// past `file_len`.
    pub fn compute(count: u64, keys_blob_len: u64, file_len: u64) -> Result<Self> {
        let ids = section("ids", TAG_HEADER_SIZE, count, ID_WIDTH, file_len)?;
        let entries = offset_entries(count, ids.end, file_len)?;
        let key_offsets = section("key offsets", ids.end, entries, OFFSET_WIDTH, file_len)?;
        let value_offsets = section("value offsets", key_offsets.end, entries, OFFSET_WIDTH, file_len)?;
        let keys_blob = section("keys blob", value_offsets.end, keys_blob_len, 1, file_len)?;
        let values_blob = keys_blob.end..file_len;

        Ok(Self {
            count,
            ids,
            key_offsets,
            value_offsets,
            keys_blob,
            values_blob,
        })
    }
}

/// A section whose end does not fit in `u64` is reported as ending at
/// `u64::MAX`.
fn overflow(section: &'static str, start: u64, file_len: u64) -> GeodexError {
    GeodexError::InvalidLayout {
        section,
        start,
        end: u64::MAX,
        file_len,
    }
}

fn offset_entries(count: u64, start: u64, file_len: u64) -> Result<u64> {
    count
        .checked_add(1)
        .ok_or_else(|| overflow("key offsets", start, file_len))
}

fn section(name: &'static str, start: u64, entries: u64, width: u64, file_len: u64) -> Result<Range<u64>> {
    let end = entries
        .checked_mul(width)
        .and_then(|len| start.checked_add(len))
        .ok_or_else(|| overflow(name, start, file_len))?;
    if end > file_len {
        return Err(GeodexError::InvalidLayout {
            section: name,
            start,
            end,
            file_len,
        });
    }
    Ok(start..end)
}

/// One independently mapped, read-only byte range of a file.
///
/// Empty ranges carry no mapping.
#[derive(Debug)]
pub struct MappedSegment {
    map: Option<Mmap>,
}

impl MappedSegment {
    /// Maps `range` of `file` read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if the range does not fit in the address space or
    /// the mapping fails.
    pub fn map(file: &File, name: &'static str, range: Range<u64>) -> Result<Self> {
        let len = usize::try_from(range.end - range.start).map_err(|_| GeodexError::InvalidLayout {
            section: name,
            start: range.start,
            end: range.end,
            file_len: range.end,
        })?;
        if len == 0 {
            return Ok(Self { map: None });
        }

        // SAFETY: geodata files are immutable once published; nothing in this
        // crate writes to a file while it is mapped.
        let map = unsafe { MmapOptions::new().offset(range.start).len(len).map(file)? };
        debug!("Mapped {} segment: {}..{} ({} bytes)", name, range.start, range.end, len);
        Ok(Self { map: Some(map) })
    }

    /// Returns the mapped bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    /// Returns the segment length in bytes.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Returns true if the segment is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
