//! Read side of the tag store.

use crate::error::{GeodexError, Result};
use crate::tags::segment::{MappedSegment, TagLayout, ID_WIDTH, OFFSET_WIDTH, TAG_HEADER_SIZE};
use crate::tags::NodeId;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, warn};

/// The five mapped columns of an opened store.
#[derive(Debug)]
struct TagColumns {
    count: usize,
    ids: MappedSegment,
    key_offsets: MappedSegment,
    value_offsets: MappedSegment,
    keys: MappedSegment,
    values: MappedSegment,
}

impl TagColumns {
    fn id(&self, index: usize) -> NodeId {
        let start = index * ID_WIDTH as usize;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.ids.as_bytes()[start..start + 8]);
        u64::from_le_bytes(buf)
    }

    fn offset(column: &MappedSegment, index: usize) -> usize {
        let start = index * OFFSET_WIDTH as usize;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&column.as_bytes()[start..start + 4]);
        u32::from_le_bytes(buf) as usize
    }

    /// Binary search for any row holding `id`.
    fn find_any(&self, id: NodeId) -> Option<usize> {
        let mut lo = 0usize;
        let mut hi = self.count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let mid_id = self.id(mid);
            if mid_id == id {
                return Some(mid);
            } else if mid_id < id {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        None
    }

    /// Widens a hit to the closed range of rows sharing its id.
    fn row_range(&self, hit: usize, id: NodeId) -> RangeInclusive<usize> {
        let mut first = hit;
        while first > 0 && self.id(first - 1) == id {
            first -= 1;
        }
        let mut last = hit;
        while last + 1 < self.count && self.id(last + 1) == id {
            last += 1;
        }
        first..=last
    }

    fn row(&self, index: usize) -> Result<(&str, &str)> {
        let key = slice_text(&self.keys, &self.key_offsets, index, "tag key")?;
        let value = slice_text(&self.values, &self.value_offsets, index, "tag value")?;
        Ok((key, value))
    }
}

fn slice_text<'a>(
    blob: &'a MappedSegment,
    offsets: &MappedSegment,
    index: usize,
    what: &'static str,
) -> Result<&'a str> {
    let start = TagColumns::offset(offsets, index);
    let end = TagColumns::offset(offsets, index + 1);
    let bytes = blob.as_bytes();
    if start > end || end > bytes.len() {
        return Err(GeodexError::Decode(format!(
            "{} range {}..{} outside blob of {} bytes at row {}",
            what,
            start,
            end,
            bytes.len(),
            index
        )));
    }
    std::str::from_utf8(&bytes[start..end]).map_err(|_| GeodexError::InvalidUtf8(what))
}

/// Segmented, memory-mapped columnar store of `(node id, key, value)` triplets.
///
/// Queries never move a shared read position: every lookup works on slices
/// borrowed from `&self`, so one store can serve concurrent callers through
/// an `Arc` without locking.
///
/// A store whose open failed (see [`TagStore::open_or_empty`]) answers every
/// query as "not found".
#[derive(Debug, Default)]
pub struct TagStore {
    path: Option<PathBuf>,
    columns: Option<TagColumns>,
    skipped_rows: AtomicU64,
    corruption_reported: AtomicBool,
}

impl TagStore {
    /// Opens a tag store file and maps its five column segments.
    ///
    /// # Errors
    ///
    /// Returns `GeodexError::Io` if the file cannot be read and
    /// `GeodexError::InvalidLayout` if the header arithmetic does not fit the
    /// file.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_len = file.metadata()?.len();
        if file_len < TAG_HEADER_SIZE {
            return Err(GeodexError::InvalidLayout {
                section: "header",
                start: 0,
                end: TAG_HEADER_SIZE,
                file_len,
            });
        }

        let mut buf8 = [0u8; 8];
        file.read_exact(&mut buf8)?;
        let count = u64::from_le_bytes(buf8);

        // The key offsets segment is not mapped yet, so the keys blob length
        // is read straight from the file.
        let keys_len_pos = TagLayout::keys_blob_len_position(count, file_len)?;
        file.seek(SeekFrom::Start(keys_len_pos))?;
        let mut buf4 = [0u8; 4];
        file.read_exact(&mut buf4)?;
        let keys_blob_len = u32::from_le_bytes(buf4) as u64;

        let layout = TagLayout::compute(count, keys_blob_len, file_len)?;
        let count = usize::try_from(count).map_err(|_| GeodexError::InvalidLayout {
            section: "ids",
            start: layout.ids.start,
            end: layout.ids.end,
            file_len,
        })?;

        let columns = TagColumns {
            count,
            ids: MappedSegment::map(&file, "ids", layout.ids)?,
            key_offsets: MappedSegment::map(&file, "key offsets", layout.key_offsets)?,
            value_offsets: MappedSegment::map(&file, "value offsets", layout.value_offsets)?,
            keys: MappedSegment::map(&file, "keys blob", layout.keys_blob)?,
            values: MappedSegment::map(&file, "values blob", layout.values_blob)?,
        };
        debug!("Opened tag store {} with {} triplets", path.display(), count);

        Ok(Self {
            path: Some(path.to_path_buf()),
            columns: Some(columns),
            skipped_rows: AtomicU64::new(0),
            corruption_reported: AtomicBool::new(false),
        })
    }

    /// Opens a tag store, degrading to an unopened store on failure.
    ///
    /// The failure is logged; every query on the returned store is empty.
    pub fn open_or_empty(path: &Path) -> Self {
        match Self::open(path) {
            Ok(store) => store,
            Err(e) => {
                warn!("Failed to open tag store {}: {}", path.display(), e);
                Self::unopened()
            }
        }
    }

    /// Creates a store with no backing file.
    pub fn unopened() -> Self {
        Self::default()
    }

    /// Returns true if the store has mapped columns.
    pub fn is_open(&self) -> bool {
        self.columns.is_some()
    }

    /// Returns the path of the backing file, if opened.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the number of triplets in the store.
    pub fn len(&self) -> usize {
        self.columns.as_ref().map_or(0, |c| c.count)
    }

    /// Returns true if the store holds no triplets.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of corrupt rows skipped by queries so far.
    pub fn skipped_rows(&self) -> u64 {
        self.skipped_rows.load(Ordering::Relaxed)
    }

    /// Returns true if at least one triplet exists for `id`.
    pub fn contains(&self, id: NodeId) -> bool {
        self.columns.as_ref().is_some_and(|c| c.find_any(id).is_some())
    }

    /// Returns all tags of node `id`.
    ///
    /// An id with no rows, or a store that is not open, yields an empty map.
    /// When a node has the same key on several rows, the later row wins.
    /// Corrupt rows are skipped and the rest of the node's rows are still
    /// returned.
    pub fn get_tags(&self, id: NodeId) -> BTreeMap<String, String> {
        let mut tags = BTreeMap::new();
        let Some(columns) = self.columns.as_ref() else {
            return tags;
        };
        let Some(hit) = columns.find_any(id) else {
            return tags;
        };

        for index in columns.row_range(hit, id) {
            match columns.row(index) {
                Ok((key, value)) => {
                    tags.insert(key.to_string(), value.to_string());
                }
                Err(e) => self.report_corrupt_row(id, index, &e),
            }
        }
        tags
    }

    fn report_corrupt_row(&self, id: NodeId, index: usize, err: &GeodexError) {
        self.skipped_rows.fetch_add(1, Ordering::Relaxed);
        if !self.corruption_reported.swap(true, Ordering::Relaxed) {
            warn!(
                "Corrupt tag store row {} for node {} in {:?}: {}",
                index, id, self.path, err
            );
        } else {
            debug!("Skipping corrupt tag store row {} for node {}: {}", index, id, err);
        }
    }
}
