//! Streaming decoder for the flat `(id, name)` source file.
//!
//! ```text
//! count: u64 LE (8 bytes, not used for decoding)
//! repeated: node_id: u64 LE | name_len: u8 | name: name_len bytes UTF-8
//! ```
//!
//! Records are parsed out of a fixed-size buffer. A record cut off by the end
//! of the buffer is left in place; the unread tail is moved to the front and
//! the buffer refilled before parsing resumes.

use crate::config::MAX_NAME_RECORD_SIZE;
use crate::error::{GeodexError, Result};
use crate::tags::NodeId;
use std::io::{ErrorKind, Read, Write};
use tracing::warn;

/// Size of the record count header.
pub const NAME_HEADER_SIZE: usize = 8;

/// One `(name, node id)` pair destined for the search store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameSearchRecord {
    /// Display name of the node.
    pub name: String,
    /// Node the name belongs to.
    pub node_id: NodeId,
}

impl NameSearchRecord {
    /// Creates a record.
    pub fn new(name: impl Into<String>, node_id: NodeId) -> Self {
        Self {
            name: name.into(),
            node_id,
        }
    }
}

enum Parsed<'a> {
    Record {
        node_id: NodeId,
        name: &'a [u8],
        consumed: usize,
    },
    Incomplete,
}

fn parse_record(bytes: &[u8]) -> Parsed<'_> {
    if bytes.len() < 9 {
        return Parsed::Incomplete;
    }
    let mut id = [0u8; 8];
    id.copy_from_slice(&bytes[0..8]);
    let name_len = bytes[8] as usize;
    let consumed = 9 + name_len;
    if bytes.len() < consumed {
        return Parsed::Incomplete;
    }
    Parsed::Record {
        node_id: u64::from_le_bytes(id),
        name: &bytes[9..consumed],
        consumed,
    }
}

/// Reads [`NameSearchRecord`]s from a source file through a fixed buffer.
pub struct NameRecordReader<R> {
    reader: R,
    buf: Vec<u8>,
    start: usize,
    end: usize,
    eof: bool,
    done: bool,
    declared_count: u64,
    skipped: u64,
}

impl<R: Read> NameRecordReader<R> {
    /// Reads the count header and prepares a buffer of `buffer_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns `GeodexError::Build` if the buffer cannot hold the largest
    /// possible record, and I/O errors if the header cannot be read.
    pub fn new(mut reader: R, buffer_size: usize) -> Result<Self> {
        if buffer_size < MAX_NAME_RECORD_SIZE {
            return Err(GeodexError::Build(format!(
                "read buffer of {} bytes cannot hold a {} byte record",
                buffer_size, MAX_NAME_RECORD_SIZE
            )));
        }
        let mut header = [0u8; NAME_HEADER_SIZE];
        reader.read_exact(&mut header)?;

        Ok(Self {
            reader,
            buf: vec![0u8; buffer_size],
            start: 0,
            end: 0,
            eof: false,
            done: false,
            declared_count: u64::from_le_bytes(header),
            skipped: 0,
        })
    }

    /// Returns the record count stated in the header.
    pub fn declared_count(&self) -> u64 {
        self.declared_count
    }

    /// Returns the number of records skipped for invalid UTF-8.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Moves the unread tail to the front and reads until the buffer is full
    /// or the source is exhausted.
    fn refill(&mut self) -> Result<()> {
        self.buf.copy_within(self.start..self.end, 0);
        self.end -= self.start;
        self.start = 0;

        while self.end < self.buf.len() {
            match self.reader.read(&mut self.buf[self.end..]) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => self.end += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Returns the next record, `None` at end of input.
    ///
    /// # Errors
    ///
    /// Returns `GeodexError::Build` if the input ends inside a record.
    pub fn next_record(&mut self) -> Result<Option<NameSearchRecord>> {
        loop {
            match parse_record(&self.buf[self.start..self.end]) {
                Parsed::Record {
                    node_id,
                    name,
                    consumed,
                } => {
                    let name = std::str::from_utf8(name).map(str::to_string);
                    self.start += consumed;
                    match name {
                        Ok(name) => return Ok(Some(NameSearchRecord { name, node_id })),
                        Err(_) => {
                            self.skipped += 1;
                            warn!("Skipping name record for node {}: invalid UTF-8", node_id);
                        }
                    }
                }
                Parsed::Incomplete if self.eof => {
                    if self.start == self.end {
                        return Ok(None);
                    }
                    return Err(GeodexError::Build(format!(
                        "source ends inside a record ({} trailing bytes)",
                        self.end - self.start
                    )));
                }
                Parsed::Incomplete => self.refill()?,
            }
        }
    }
}

impl<R: Read> Iterator for NameRecordReader<R> {
    type Item = Result<NameSearchRecord>;

    /// Fused: ends after the first error or the last record.
    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Writes a name index source file.
///
/// # Errors
///
/// Returns `GeodexError::Build` if a name is longer than 255 bytes.
pub fn write_name_records<W: Write>(writer: &mut W, records: &[NameSearchRecord]) -> Result<()> {
    writer.write_all(&(records.len() as u64).to_le_bytes())?;
    for record in records {
        let name = record.name.as_bytes();
        let len = u8::try_from(name.len()).map_err(|_| {
            GeodexError::Build(format!(
                "name of node {} is {} bytes, limit is 255",
                record.node_id,
                name.len()
            ))
        })?;
        writer.write_all(&record.node_id.to_le_bytes())?;
        writer.write_all(&[len])?;
        writer.write_all(name)?;
    }
    Ok(())
}
