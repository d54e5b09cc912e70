//! Linear feature scanner.

use crate::error::{GeodexError, Result};
use crate::fgb::geometry::{decode_geometry, Geometry};
use crate::fgb::header::{decode_columns, is_valid_magic, Header};
use crate::fgb::properties::{decode_properties, Properties};
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, warn};

/// A decoded feature.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    /// Polygon or MultiPolygon geometry.
    pub geometry: Geometry,
    /// Properties keyed by column name.
    pub properties: Properties,
}

/// Scans the size-prefixed features of a FlatGeobuf file.
///
/// Each scan starts again from the first feature, so the reader holds no
/// state between lookups beyond the parsed header.
pub struct FeatureReader<R> {
    reader: R,
    header: Header,
    features_start: u64,
    buf: Vec<u8>,
}

impl FeatureReader<BufReader<File>> {
    /// Opens a feature file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its header is invalid.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        debug!("Opening feature file {}", path.display());
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> FeatureReader<R> {
    /// Parses the header and skips the packed index.
    ///
    /// # Errors
    ///
    /// Returns `GeodexError::InvalidMagic` for a non-FlatGeobuf stream and
    /// `GeodexError::Decode` for a malformed header.
    pub fn new(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if !is_valid_magic(&magic) {
            return Err(GeodexError::InvalidMagic(magic));
        }

        let mut buf4 = [0u8; 4];
        reader.read_exact(&mut buf4)?;
        let header_len = u32::from_le_bytes(buf4) as usize;
        let mut header_buf = vec![0u8; header_len];
        reader.read_exact(&mut header_buf)?;
        let header = Header::decode(&header_buf)?;

        let index_size = header.index_size();
        let features_start = 8 + 4 + header_len as u64 + index_size;
        debug!(
            "Feature file: {} features, {} columns, skipping {} index bytes",
            header.features_count,
            header.columns.len(),
            index_size
        );

        Ok(Self {
            reader,
            header,
            features_start,
            buf: Vec::new(),
        })
    }

    /// Returns the parsed header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the byte offset of the first feature.
    pub fn features_start(&self) -> u64 {
        self.features_start
    }

    fn rewind(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(self.features_start))?;
        Ok(())
    }

    /// Loads the next feature into `buf`; false at end of file.
    fn next_buffer(&mut self) -> Result<bool> {
        let mut buf4 = [0u8; 4];
        match self.reader.read_exact(&mut buf4) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(false),
            Err(e) => return Err(e.into()),
        }
        let size = u32::from_le_bytes(buf4) as usize;
        self.buf.resize(size, 0);
        match self.reader.read_exact(&mut self.buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                warn!("Truncated feature of {} bytes at end of file", size);
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Decodes the properties of the feature in `buf`.
    fn properties(&self) -> Result<Properties> {
        let feature = flatgeobuf::root_as_feature(&self.buf)?;
        let bytes = feature.properties().map(|p| p.bytes()).unwrap_or_default();
        match decode_columns(feature.columns())? {
            Some(columns) => decode_properties(bytes, &columns),
            None => decode_properties(bytes, &self.header.columns),
        }
    }

    /// Decodes the geometry of the feature in `buf`.
    fn geometry(&self) -> Result<Geometry> {
        let feature = flatgeobuf::root_as_feature(&self.buf)?;
        let geometry = feature
            .geometry()
            .ok_or_else(|| GeodexError::Decode("feature without geometry".into()))?;
        decode_geometry(&geometry, self.header.geometry_type)
    }

    /// Finds the first feature whose property `key` equals `value`, ignoring
    /// case.
    ///
    /// Properties are decoded for every feature; the geometry only for the
    /// match. Features that fail to decode are skipped.
    ///
    /// # Errors
    ///
    /// Returns `GeodexError::UnsupportedGeometry` if the matching feature is
    /// not a Polygon or MultiPolygon, and I/O errors from the source.
    pub fn find_by_property(&mut self, key: &str, value: &str) -> Result<Option<Feature>> {
        self.rewind()?;
        let mut index = 0u64;
        while self.next_buffer()? {
            index += 1;
            let properties = match self.properties() {
                Ok(properties) => properties,
                Err(e) => {
                    warn!("Skipping feature {}: {}", index - 1, e);
                    continue;
                }
            };
            if !properties.get(key).is_some_and(|v| v.matches(value)) {
                continue;
            }
            match self.geometry() {
                Ok(geometry) => {
                    debug!("Found {}={} at feature {}", key, value, index - 1);
                    return Ok(Some(Feature {
                        geometry,
                        properties,
                    }));
                }
                Err(e @ GeodexError::UnsupportedGeometry(_)) => return Err(e),
                Err(e) => warn!("Skipping feature {} with bad geometry: {}", index - 1, e),
            }
        }
        debug!("No feature with {}={} among {} features", key, value, index);
        Ok(None)
    }

    /// Iterates over every feature in file order.
    ///
    /// Decode failures are yielded as errors for the affected feature; the
    /// iteration continues with the next one.
    pub fn features(&mut self) -> Result<Features<'_, R>> {
        self.rewind()?;
        Ok(Features {
            reader: self,
            done: false,
        })
    }
}

/// Iterator returned by [`FeatureReader::features`].
pub struct Features<'a, R> {
    reader: &'a mut FeatureReader<R>,
    done: bool,
}

impl<R: Read + Seek> Iterator for Features<'_, R> {
    type Item = Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_buffer() {
            Ok(true) => {}
            Ok(false) => {
                self.done = true;
                return None;
            }
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        }
        let feature = match self.reader.properties() {
            Ok(properties) => self.reader.geometry().map(|geometry| Feature {
                geometry,
                properties,
            }),
            Err(e) => Err(e),
        };
        Some(feature)
    }
}
