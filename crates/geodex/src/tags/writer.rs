//! Tag store file writer.

use crate::error::{GeodexError, Result};
use crate::tags::NodeId;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Builds a tag store file from triplets pushed in ascending id order.
///
/// Columns are accumulated in memory and written in file order by
/// [`TagFileWriter::finish`].
#[derive(Debug, Default)]
pub struct TagFileWriter {
    ids: Vec<NodeId>,
    key_offsets: Vec<u32>,
    value_offsets: Vec<u32>,
    keys: Vec<u8>,
    values: Vec<u8>,
}

impl TagFileWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self {
            key_offsets: vec![0],
            value_offsets: vec![0],
            ..Default::default()
        }
    }

    /// Appends one triplet.
    ///
    /// # Errors
    ///
    /// Returns `GeodexError::InvalidInput` if `id` is smaller than the previous id
    /// or a blob would outgrow 32-bit offsets.
    pub fn push(&mut self, id: NodeId, key: &str, value: &str) -> Result<()> {
        if let Some(&last) = self.ids.last() {
            if id < last {
                return Err(GeodexError::InvalidInput(format!(
                    "node ids must be non-decreasing: {} after {}",
                    id, last
                )));
            }
        }
        let key_end = blob_end(self.keys.len(), key.len(), "keys")?;
        let value_end = blob_end(self.values.len(), value.len(), "values")?;

        self.ids.push(id);
        self.keys.extend_from_slice(key.as_bytes());
        self.values.extend_from_slice(value.as_bytes());
        self.key_offsets.push(key_end);
        self.value_offsets.push(value_end);
        Ok(())
    }

    /// Returns the number of triplets pushed so far.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if no triplet has been pushed.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Writes the file image to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&(self.ids.len() as u64).to_le_bytes())?;
        for id in &self.ids {
            writer.write_all(&id.to_le_bytes())?;
        }
        for offset in &self.key_offsets {
            writer.write_all(&offset.to_le_bytes())?;
        }
        for offset in &self.value_offsets {
            writer.write_all(&offset.to_le_bytes())?;
        }
        writer.write_all(&self.keys)?;
        writer.write_all(&self.values)?;
        Ok(())
    }

    /// Writes the file to `path` and syncs it, returning the triplet count.
    pub fn finish(self, path: &Path) -> Result<u64> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        file.sync_all()?;
        Ok(self.ids.len() as u64)
    }
}

fn blob_end(current: usize, added: usize, blob: &str) -> Result<u32> {
    current
        .checked_add(added)
        .and_then(|end| u32::try_from(end).ok())
        .ok_or_else(|| GeodexError::InvalidInput(format!("{} blob exceeds 32-bit offsets", blob)))
}
