//! Segmented columnar tag store.
//!
//! Answers "all tags of node X" over a sorted `(id, key, value)` triplet file
//! by binary search on a memory-mapped id column.

pub mod segment;
pub mod store;
pub mod writer;

/// Identifier of a map node.
pub type NodeId = u64;

pub use segment::{MappedSegment, TagLayout};
pub use store::TagStore;
pub use writer::TagFileWriter;
