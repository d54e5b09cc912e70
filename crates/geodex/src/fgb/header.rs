//! FlatGeobuf header: magic, column directory and packed index sizing.

use crate::error::{GeodexError, Result};
use flatbuffers::{FlatBufferBuilder, ForwardsUOffset, Vector, WIPOffset};

/// Magic bytes of a version 3 FlatGeobuf file.
pub const MAGIC_BYTES: [u8; 8] = [b'f', b'g', b'b', 3, b'f', b'g', b'b', 0];

/// Size of one packed R-tree node: four `f64` bounds and a `u64` offset.
pub const NODE_ITEM_SIZE: u64 = 40;

/// Node size assumed when the header does not declare one.
pub const DEFAULT_INDEX_NODE_SIZE: u16 = 16;

/// Returns true if `magic` starts and continues like a FlatGeobuf file.
///
/// The version byte is not checked.
pub fn is_valid_magic(magic: &[u8; 8]) -> bool {
    magic[0..3] == MAGIC_BYTES[0..3] && magic[4..7] == MAGIC_BYTES[4..7]
}

/// Byte length of the packed R-tree that follows the header.
///
/// Level sizes are reduced by `ceil(n / node_size)` until one node remains;
/// every node is [`NODE_ITEM_SIZE`] bytes. A node size of 1 never reduces
/// and is treated as 2. No features or a node size of 0 means no index.
pub fn packed_index_size(features_count: u64, node_size: u16) -> u64 {
    if features_count == 0 || node_size == 0 {
        return 0;
    }
    let node_size = u64::from(node_size.max(2));
    let mut level = features_count;
    let mut nodes = level;
    loop {
        level = level.div_ceil(node_size);
        nodes += level;
        if level <= 1 {
            break;
        }
    }
    nodes * NODE_ITEM_SIZE
}

/// Property column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ColumnType {
    /// Signed 8-bit integer.
    Byte = 0,
    /// Unsigned 8-bit integer.
    UByte = 1,
    /// Boolean stored as one byte.
    Bool = 2,
    /// Signed 16-bit integer.
    Short = 3,
    /// Unsigned 16-bit integer.
    UShort = 4,
    /// Signed 32-bit integer.
    Int = 5,
    /// Unsigned 32-bit integer.
    UInt = 6,
    /// Signed 64-bit integer.
    Long = 7,
    /// Unsigned 64-bit integer.
    ULong = 8,
    /// 32-bit float.
    Float = 9,
    /// 64-bit float.
    Double = 10,
    /// Length-prefixed UTF-8 text.
    String = 11,
    /// Length-prefixed JSON text.
    Json = 12,
    /// Length-prefixed ISO 8601 text.
    DateTime = 13,
    /// Length-prefixed opaque bytes; never decoded.
    Binary = 14,
}

impl ColumnType {
    /// Creates a ColumnType from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Byte),
            1 => Some(Self::UByte),
            2 => Some(Self::Bool),
            3 => Some(Self::Short),
            4 => Some(Self::UShort),
            5 => Some(Self::Int),
            6 => Some(Self::UInt),
            7 => Some(Self::Long),
            8 => Some(Self::ULong),
            9 => Some(Self::Float),
            10 => Some(Self::Double),
            11 => Some(Self::String),
            12 => Some(Self::Json),
            13 => Some(Self::DateTime),
            14 => Some(Self::Binary),
            _ => None,
        }
    }
}

/// One entry of the column directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Property name.
    pub name: String,
    /// Declared value type.
    pub column_type: ColumnType,
}

impl Column {
    /// Creates a column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    pub(crate) fn create<'a>(
        &self,
        fbb: &mut FlatBufferBuilder<'a>,
    ) -> WIPOffset<flatgeobuf::Column<'a>> {
        let name = fbb.create_string(&self.name);
        flatgeobuf::Column::create(
            fbb,
            &flatgeobuf::ColumnArgs {
                name: Some(name),
                type_: flatgeobuf::ColumnType(self.column_type as u8),
                ..Default::default()
            },
        )
    }
}

/// Flatbuffer column directory as stored in headers and features.
pub(crate) type ColumnVector<'a> = Vector<'a, ForwardsUOffset<flatgeobuf::Column<'a>>>;

/// Converts a column directory; `None` when the table carries none.
pub(crate) fn decode_columns(columns: Option<ColumnVector<'_>>) -> Result<Option<Vec<Column>>> {
    let Some(columns) = columns else {
        return Ok(None);
    };
    let mut decoded = Vec::with_capacity(columns.len());
    for column in columns.iter() {
        let raw_type = column.type_().0;
        let column_type = ColumnType::from_u8(raw_type)
            .ok_or_else(|| GeodexError::Decode(format!("unknown column type {}", raw_type)))?;
        decoded.push(Column::new(column.name(), column_type));
    }
    Ok(Some(decoded))
}

/// The parts of a FlatGeobuf header this crate uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Dataset name.
    pub name: Option<String>,
    /// Geometry type shared by all features, 0 when mixed.
    pub geometry_type: u8,
    /// Column directory, indexed by property column index.
    pub columns: Vec<Column>,
    /// Number of features in the file.
    pub features_count: u64,
    /// Node size of the packed R-tree, 0 when the file has no index.
    pub index_node_size: u16,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            name: None,
            geometry_type: 0,
            columns: Vec::new(),
            features_count: 0,
            index_node_size: DEFAULT_INDEX_NODE_SIZE,
        }
    }
}

impl Header {
    /// Decodes a header flatbuffer.
    ///
    /// # Errors
    ///
    /// Returns `GeodexError::Decode` if the buffer fails flatbuffer
    /// verification or declares an unknown column type.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let header = flatgeobuf::root_as_header(buf)?;
        Ok(Self {
            name: header.name().map(str::to_string),
            geometry_type: header.geometry_type().0,
            columns: decode_columns(header.columns())?.unwrap_or_default(),
            features_count: header.features_count(),
            index_node_size: header.index_node_size(),
        })
    }

    /// Encodes the header as a flatbuffer, without size prefix.
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut fbb = FlatBufferBuilder::new();
        let name = self.name.as_deref().map(|name| fbb.create_string(name));
        let columns = if self.columns.is_empty() {
            None
        } else {
            let columns: Vec<_> = self.columns.iter().map(|c| c.create(&mut fbb)).collect();
            Some(fbb.create_vector(&columns))
        };
        let header = flatgeobuf::Header::create(
            &mut fbb,
            &flatgeobuf::HeaderArgs {
                name,
                geometry_type: flatgeobuf::GeometryType(self.geometry_type),
                columns,
                features_count: self.features_count,
                index_node_size: self.index_node_size,
                ..Default::default()
            },
        );
        flatgeobuf::finish_header_buffer(&mut fbb, header);
        fbb.finished_data().to_vec()
    }

    /// Byte length of the packed index following this header.
    pub fn index_size(&self) -> u64 {
        packed_index_size(self.features_count, self.index_node_size)
    }

    /// Returns the index of the column called `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Independent reduction: build the level sizes bottom-up, then sum.
    fn reference_index_size(count: u64, node_size: u16) -> u64 {
        if count == 0 || node_size == 0 {
            return 0;
        }
        let node_size = u64::from(node_size).max(2);
        let mut levels = vec![count];
        while *levels.last().unwrap() > 1 || levels.len() == 1 {
            let last = *levels.last().unwrap();
            levels.push((last + node_size - 1) / node_size);
        }
        levels.iter().sum::<u64>() * 40
    }

    #[test]
    fn test_packed_index_size_matches_reference() {
        for &count in &[0u64, 1, 16, 17, 1000, 1_000_000] {
            for &node_size in &[1u16, 2, 16] {
                assert_eq!(
                    packed_index_size(count, node_size),
                    reference_index_size(count, node_size),
                    "count={} node_size={}",
                    count,
                    node_size
                );
            }
        }
    }

    #[test]
    fn test_packed_index_size_known_values() {
        // 1000 -> 63 -> 4 -> 1
        assert_eq!(packed_index_size(1000, 16), (1000 + 63 + 4 + 1) * 40);
        // A single feature still has a root above it.
        assert_eq!(packed_index_size(1, 16), 2 * 40);
        // 16 -> 1
        assert_eq!(packed_index_size(16, 16), 17 * 40);
        // 17 -> 2 -> 1
        assert_eq!(packed_index_size(17, 16), 20 * 40);
        assert_eq!(packed_index_size(0, 16), 0);
        assert_eq!(packed_index_size(1000, 0), 0);
        assert_eq!(packed_index_size(5, 1), packed_index_size(5, 2));
    }

    #[test]
    fn test_header_roundtrip() {
        let header = Header {
            name: Some("countries".into()),
            geometry_type: 6,
            columns: vec![
                Column::new("name", ColumnType::String),
                Column::new("pop", ColumnType::ULong),
            ],
            features_count: 250,
            index_node_size: 16,
        };
        let decoded = Header::decode(&header.encode()).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(decoded.column_index("pop"), Some(1));
        assert_eq!(decoded.column_index("missing"), None);
    }

    #[test]
    fn test_decode_header_written_by_flatgeobuf() {
        let mut fbb = FlatBufferBuilder::new();
        let name = fbb.create_string("iso_a2");
        let column = flatgeobuf::Column::create(
            &mut fbb,
            &flatgeobuf::ColumnArgs {
                name: Some(name),
                type_: flatgeobuf::ColumnType::String,
                ..Default::default()
            },
        );
        let columns = fbb.create_vector(&[column]);
        let header = flatgeobuf::Header::create(
            &mut fbb,
            &flatgeobuf::HeaderArgs {
                geometry_type: flatgeobuf::GeometryType::MultiPolygon,
                columns: Some(columns),
                features_count: 3,
                ..Default::default()
            },
        );
        fbb.finish(header, None);

        let decoded = Header::decode(fbb.finished_data()).unwrap();
        assert_eq!(decoded.name, None);
        assert_eq!(decoded.geometry_type, 6);
        assert_eq!(decoded.columns, vec![Column::new("iso_a2", ColumnType::String)]);
        assert_eq!(decoded.index_node_size, DEFAULT_INDEX_NODE_SIZE);
        assert_eq!(decoded.index_size(), packed_index_size(3, 16));
    }

    #[test]
    fn test_unknown_column_type_and_garbage_are_rejected() {
        let mut fbb = FlatBufferBuilder::new();
        let name = fbb.create_string("blob");
        let column = flatgeobuf::Column::create(
            &mut fbb,
            &flatgeobuf::ColumnArgs {
                name: Some(name),
                type_: flatgeobuf::ColumnType(42),
                ..Default::default()
            },
        );
        let columns = fbb.create_vector(&[column]);
        let header = flatgeobuf::Header::create(
            &mut fbb,
            &flatgeobuf::HeaderArgs {
                columns: Some(columns),
                ..Default::default()
            },
        );
        fbb.finish(header, None);

        assert!(matches!(
            Header::decode(fbb.finished_data()),
            Err(GeodexError::Decode(_))
        ));
        assert!(matches!(
            Header::decode(&[0xff, 0xff, 0xff, 0x7f, 1, 2]),
            Err(GeodexError::Decode(_))
        ));
    }

    #[test]
    fn test_magic_validation() {
        assert!(is_valid_magic(&MAGIC_BYTES));
        let mut other_version = MAGIC_BYTES;
        other_version[3] = 1;
        assert!(is_valid_magic(&other_version));
        assert!(!is_valid_magic(b"PK\x03\x04\0\0\0\0"));
    }
}
