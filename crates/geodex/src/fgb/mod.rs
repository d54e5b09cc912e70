//! FlatGeobuf subset reader.
//!
//! Supports what boundary lookups need: header and column directory parsing,
//! skipping the packed R-tree by size, a linear scan for one feature by
//! property value, and Polygon / MultiPolygon geometry.
//!
//! Header and feature flatbuffers are read and built through the generated
//! tables of the `flatgeobuf` crate; property buffers and index sizing are
//! handled here.
//!
//! ## File Structure
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  Magic "fgb\x03fgb\x00" (8 bytes)         │
//! ├──────────────────────────────────────────┤
//! │  Header length: u32 + header flatbuffer  │
//! ├──────────────────────────────────────────┤
//! │  Packed R-tree (optional, skipped)       │
//! ├──────────────────────────────────────────┤
//! │  Features: u32 size + feature flatbuffer │
//! │  (repeated)                              │
//! └──────────────────────────────────────────┘
//! ```

pub mod geometry;
pub mod header;
pub mod properties;
pub mod reader;
pub mod writer;

pub use geometry::{BoundingBox, Coord, Geometry, Polygon, Ring};
pub use header::{packed_index_size, Column, ColumnType, Header};
pub use properties::{decode_properties, ColumnValue, Properties, PropertyWriter};
pub use reader::{Feature, FeatureReader};
pub use writer::FeatureFileWriter;
