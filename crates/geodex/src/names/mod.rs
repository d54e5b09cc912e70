//! Build-once name search index.
//!
//! Streams a flat `(id, name)` file into an external full-text store the
//! first time it runs and records completion in a persisted flag.

pub mod builder;
pub mod source;
pub mod store;

pub use builder::{BuildOutcome, NameIndex};
pub use source::{write_name_records, NameRecordReader, NameSearchRecord};
pub use store::{FileSettings, MemorySearchStore, MemorySettings, SearchStore, SettingsStore};
