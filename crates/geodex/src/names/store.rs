//! Search and settings store interfaces.
//!
//! The full-text engine and the settings store are owned by the host
//! application. [`MemorySearchStore`], [`MemorySettings`] and
//! [`FileSettings`] are lightweight implementations for tools and tests.

use crate::error::{GeodexError, Result};
use crate::names::source::NameSearchRecord;
use crate::tags::NodeId;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A full-text searchable store of `(name, node id)` rows.
pub trait SearchStore {
    /// Starts the write transaction of a build.
    fn begin(&mut self) -> Result<()>;

    /// Removes every row.
    fn clear(&mut self) -> Result<()>;

    /// Inserts a batch of rows.
    fn insert_all(&mut self, records: &[NameSearchRecord]) -> Result<()>;

    /// Commits the write transaction.
    fn commit(&mut self) -> Result<()>;

    /// Abandons the write transaction.
    fn rollback(&mut self) -> Result<()>;

    /// Asks the engine to optimize its index after a bulk load.
    fn optimize(&mut self) -> Result<()>;

    /// Returns node ids whose names match `query`, best match first.
    fn search(&self, query: &str) -> Result<Vec<NodeId>>;
}

/// A small persisted key-value settings store.
pub trait SettingsStore {
    /// Returns the flag `name`, false when unset.
    fn get_flag(&self, name: &str) -> Result<bool>;

    /// Sets and persists the flag `name`.
    fn set_flag(&mut self, name: &str, value: bool) -> Result<()>;
}

#[derive(Debug, Clone)]
struct Row {
    folded: String,
    node_id: NodeId,
}

impl Row {
    fn new(record: &NameSearchRecord) -> Self {
        Self {
            folded: record.name.to_lowercase(),
            node_id: record.node_id,
        }
    }
}

/// In-memory [`SearchStore`] with transactional staging.
///
/// Every query token must occur in the name (case-insensitive). Exact name
/// matches rank first, then names starting with the query, then the rest;
/// shorter names win ties.
#[derive(Debug, Default)]
pub struct MemorySearchStore {
    committed: Vec<Row>,
    staged: Option<Vec<Row>>,
    insert_calls: u64,
    inserted_records: u64,
    optimize_calls: u64,
}

impl MemorySearchStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of committed rows.
    pub fn len(&self) -> usize {
        self.committed.len()
    }

    /// Returns true if no row is committed.
    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    /// Returns how many times `insert_all` was called.
    pub fn insert_calls(&self) -> u64 {
        self.insert_calls
    }

    /// Returns how many records were passed to `insert_all`.
    pub fn inserted_records(&self) -> u64 {
        self.inserted_records
    }

    /// Returns how many times `optimize` was called.
    pub fn optimize_calls(&self) -> u64 {
        self.optimize_calls
    }

    fn staged(&mut self) -> Result<&mut Vec<Row>> {
        self.staged
            .as_mut()
            .ok_or_else(|| GeodexError::Store("no active write transaction".into()))
    }
}

impl SearchStore for MemorySearchStore {
    fn begin(&mut self) -> Result<()> {
        if self.staged.is_some() {
            return Err(GeodexError::Store("write transaction already active".into()));
        }
        self.staged = Some(self.committed.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.staged()?.clear();
        Ok(())
    }

    fn insert_all(&mut self, records: &[NameSearchRecord]) -> Result<()> {
        self.staged()?.extend(records.iter().map(Row::new));
        self.insert_calls += 1;
        self.inserted_records += records.len() as u64;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let staged = self
            .staged
            .take()
            .ok_or_else(|| GeodexError::Store("no active write transaction".into()))?;
        self.committed = staged;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.staged = None;
        Ok(())
    }

    fn optimize(&mut self) -> Result<()> {
        self.committed
            .sort_by(|a, b| a.folded.cmp(&b.folded).then(a.node_id.cmp(&b.node_id)));
        self.optimize_calls += 1;
        Ok(())
    }

    fn search(&self, query: &str) -> Result<Vec<NodeId>> {
        let query = query.trim().to_lowercase();
        let tokens: Vec<&str> = query.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<(u8, usize, NodeId)> = self
            .committed
            .iter()
            .filter(|row| tokens.iter().all(|t| row.folded.contains(t)))
            .map(|row| {
                let rank = if row.folded == query {
                    0
                } else if row.folded.starts_with(&query) {
                    1
                } else {
                    2
                };
                (rank, row.folded.len(), row.node_id)
            })
            .collect();
        hits.sort_unstable();

        // A node keeps the position of its best-ranked name.
        let mut seen = HashSet::with_capacity(hits.len());
        Ok(hits
            .into_iter()
            .filter_map(|(_, _, id)| seen.insert(id).then_some(id))
            .collect())
    }
}

/// In-memory [`SettingsStore`].
#[derive(Debug, Default, Clone)]
pub struct MemorySettings {
    flags: HashMap<String, bool>,
}

impl MemorySettings {
    /// Creates an empty settings store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettings {
    fn get_flag(&self, name: &str) -> Result<bool> {
        Ok(self.flags.get(name).copied().unwrap_or(false))
    }

    fn set_flag(&mut self, name: &str, value: bool) -> Result<()> {
        self.flags.insert(name.to_string(), value);
        Ok(())
    }
}

/// [`SettingsStore`] persisted as a JSON object.
///
/// Keys that are not flags are preserved on write. Each update replaces the
/// file atomically (temp file + rename).
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    values: Map<String, Value>,
}

impl FileSettings {
    /// Loads settings from `path`; a missing file yields empty settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is not a
    /// JSON object.
    pub fn open(path: &Path) -> Result<Self> {
        let values = match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    /// Returns the settings file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        let tmp_path = self.path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(&self.values)?;
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        debug!("Persisted settings to {}", self.path.display());
        Ok(())
    }
}

impl SettingsStore for FileSettings {
    fn get_flag(&self, name: &str) -> Result<bool> {
        Ok(self.values.get(name).and_then(Value::as_bool).unwrap_or(false))
    }

    fn set_flag(&mut self, name: &str, value: bool) -> Result<()> {
        self.values.insert(name.to_string(), Value::Bool(value));
        self.persist()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn loaded_store(names: &[(&str, NodeId)]) -> MemorySearchStore {
        let mut store = MemorySearchStore::new();
        let records: Vec<NameSearchRecord> = names
            .iter()
            .map(|(name, id)| NameSearchRecord::new(*name, *id))
            .collect();
        store.begin().unwrap();
        store.insert_all(&records).unwrap();
        store.commit().unwrap();
        store
    }

    #[test]
    fn test_search_ranking() {
        let store = loaded_store(&[
            ("Rua do Porto", 1),
            ("Porto", 2),
            ("Porto Santo", 3),
            ("Oporto Hotel", 4),
        ]);
        assert_eq!(store.search("porto").unwrap(), vec![2, 3, 1, 4]);
        assert_eq!(store.search("PORTO santo").unwrap(), vec![3]);
        assert!(store.search("lisboa").unwrap().is_empty());
        assert!(store.search("   ").unwrap().is_empty());
    }

    #[test]
    fn test_node_with_many_names_listed_once() {
        let mut names = vec![("Porto", 7), ("Porto Alegre", 8)];
        let aliases: Vec<String> = (0..500).map(|i| format!("Avenida do Porto {}", i)).collect();
        names.extend(aliases.iter().map(|alias| (alias.as_str(), 7)));
        names.push(("Rua do Porto", 9));
        let store = loaded_store(&names);

        assert_eq!(store.search("porto").unwrap(), vec![7, 8, 9]);
    }

    #[test]
    fn test_rollback_discards_staged_rows() {
        let mut store = loaded_store(&[("Faro", 1)]);
        store.begin().unwrap();
        store.clear().unwrap();
        store.insert_all(&[NameSearchRecord::new("Braga", 2)]).unwrap();
        store.rollback().unwrap();

        assert_eq!(store.search("faro").unwrap(), vec![1]);
        assert!(store.search("braga").unwrap().is_empty());
    }

    #[test]
    fn test_insert_outside_transaction_fails() {
        let mut store = MemorySearchStore::new();
        let result = store.insert_all(&[NameSearchRecord::new("x", 1)]);
        assert!(matches!(result, Err(GeodexError::Store(_))));
        assert_eq!(store.insert_calls(), 0);
    }

    #[test]
    fn test_file_settings_persist() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"theme": "dark"}"#).unwrap();

        let mut settings = FileSettings::open(&path).unwrap();
        assert!(!settings.get_flag("built").unwrap());
        settings.set_flag("built", true).unwrap();

        let reloaded = FileSettings::open(&path).unwrap();
        assert!(reloaded.get_flag("built").unwrap());
        assert!(!reloaded.get_flag("theme").unwrap());
        let raw: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
    }

    #[test]
    fn test_file_settings_missing_and_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.json");
        assert!(!FileSettings::open(&path).unwrap().get_flag("x").unwrap());

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(FileSettings::open(&path), Err(GeodexError::Store(_))));
    }
}
