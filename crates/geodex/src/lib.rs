//! Geodex - offline geodata engine
//!
//! This crate answers queries over large pre-built geodata files without
//! loading them into heap memory.
//!
//! # Components
//!
//! - [`TagStore`]: segmented, memory-mapped triplet store; all tags of a node
//!   by binary search
//! - [`FeatureReader`]: FlatGeobuf subset scanner; one boundary polygon by
//!   property value
//! - [`NameIndex`]: streams a flat name file into a full-text store once per
//!   installation
//!
//! All calls block. Callers move them off interactive threads.
//!
//! # Example
//!
//! ```rust,ignore
//! use geodex::{FeatureReader, TagStore};
//!
//! let tags = TagStore::open_or_empty(Path::new("/data/tags.bin"));
//! let name = tags.get_tags(node_id).get("name").cloned();
//!
//! let mut countries = FeatureReader::open(Path::new("/data/countries.fgb"))?;
//! if let Some(feature) = countries.find_by_property("iso_a2", "pt")? {
//!     draw(feature.geometry.polygons());
//! }
//! ```

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod fgb;
pub mod names;
pub mod tags;

pub use config::NameIndexConfig;
pub use error::{GeodexError, Result};
pub use fgb::{ColumnValue, Feature, FeatureReader, Geometry, Polygon, Ring};
pub use names::{BuildOutcome, NameIndex, NameSearchRecord, SearchStore, SettingsStore};
pub use tags::{NodeId, TagStore};
