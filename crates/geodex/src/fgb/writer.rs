//! Feature file writer.

use crate::error::{GeodexError, Result};
use crate::fgb::geometry::Geometry;
use crate::fgb::header::{Header, MAGIC_BYTES};
use flatbuffers::FlatBufferBuilder;
use std::io::Write;

/// Writes a FlatGeobuf-layout file: magic, header, a zero-filled packed
/// index of the size the header implies, then size-prefixed features.
///
/// The header's `features_count` must match the number of features written,
/// since it determines the index size readers skip.
pub struct FeatureFileWriter<W: Write> {
    writer: W,
    expected: u64,
    written: u64,
}

impl<W: Write> FeatureFileWriter<W> {
    /// Writes the magic, header and index placeholder.
    pub fn new(mut writer: W, header: Header) -> Result<Self> {
        writer.write_all(&MAGIC_BYTES)?;
        let header_buf = header.encode();
        writer.write_all(&(header_buf.len() as u32).to_le_bytes())?;
        writer.write_all(&header_buf)?;

        let mut remaining = header.index_size();
        let zeros = [0u8; 4096];
        while remaining > 0 {
            let chunk = remaining.min(zeros.len() as u64) as usize;
            writer.write_all(&zeros[..chunk])?;
            remaining -= chunk as u64;
        }

        Ok(Self {
            writer,
            expected: header.features_count,
            written: 0,
        })
    }

    /// Appends one feature with a packed property buffer.
    pub fn write_feature(&mut self, geometry: &Geometry, properties: &[u8]) -> Result<()> {
        let mut fbb = FlatBufferBuilder::new();
        let geometry = geometry.create(&mut fbb);
        let properties = fbb.create_vector(properties);
        let feature = flatgeobuf::Feature::create(
            &mut fbb,
            &flatgeobuf::FeatureArgs {
                geometry: Some(geometry),
                properties: Some(properties),
                columns: None,
            },
        );
        flatgeobuf::finish_size_prefixed_feature_buffer(&mut fbb, feature);
        self.writer.write_all(fbb.finished_data())?;
        self.written += 1;
        Ok(())
    }

    /// Flushes and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Returns `GeodexError::InvalidInput` if the number of written features does
    /// not match the header.
    pub fn finish(mut self) -> Result<W> {
        if self.written != self.expected {
            return Err(GeodexError::InvalidInput(format!(
                "header declares {} features, {} written",
                self.expected, self.written
            )));
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}
