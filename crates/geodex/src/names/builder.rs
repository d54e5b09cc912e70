//! Build-once name index.

use crate::config::NameIndexConfig;
use crate::error::{GeodexError, Result};
use crate::names::source::{NameRecordReader, NameSearchRecord};
use crate::names::store::{SearchStore, SettingsStore};
use crate::tags::NodeId;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of [`NameIndex::ensure_built`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// The persisted flag was already set; nothing was written.
    AlreadyBuilt,
    /// The index was built from scratch.
    Built {
        /// Number of records inserted.
        records: u64,
    },
}

/// Name search over an external full-text store, loaded once from a flat
/// `(id, name)` file.
///
/// The build runs inside one store transaction and clears the store first,
/// so an attempt that was killed midway leaves no rows behind for the next
/// one. The persisted flag is set only after the build commits.
pub struct NameIndex<S, K> {
    store: S,
    settings: K,
    config: NameIndexConfig,
}

impl<S: SearchStore, K: SettingsStore> NameIndex<S, K> {
    /// Creates a name index over `store`, guarded by a flag in `settings`.
    ///
    /// # Errors
    ///
    /// Returns `GeodexError::Build` if `config` is invalid.
    pub fn new(store: S, settings: K, config: NameIndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            settings,
            config,
        })
    }

    /// Returns true if the persisted build flag is set.
    pub fn is_built(&self) -> Result<bool> {
        self.settings.get_flag(&self.config.flag_name)
    }

    /// Builds the index from the file at `source` unless already built.
    ///
    /// The source file is only opened when a build is needed.
    pub fn ensure_built(&mut self, source: &Path) -> Result<BuildOutcome> {
        if self.is_built()? {
            debug!("Name index already built, skipping {}", source.display());
            return Ok(BuildOutcome::AlreadyBuilt);
        }
        let file = File::open(source).map_err(|e| {
            GeodexError::Build(format!("open {}: {}", source.display(), e))
        })?;
        self.build_and_mark(BufReader::new(file))
    }

    /// Builds the index from `reader` unless already built.
    pub fn ensure_built_from<R: Read>(&mut self, reader: R) -> Result<BuildOutcome> {
        if self.is_built()? {
            debug!("Name index already built");
            return Ok(BuildOutcome::AlreadyBuilt);
        }
        self.build_and_mark(reader)
    }

    fn build_and_mark<R: Read>(&mut self, reader: R) -> Result<BuildOutcome> {
        let records = self.build(reader)?;
        self.settings.set_flag(&self.config.flag_name, true)?;
        Ok(BuildOutcome::Built { records })
    }

    /// Loads every record of `reader` into the store, replacing its rows.
    ///
    /// Does not read or set the build flag.
    ///
    /// # Errors
    ///
    /// Returns `GeodexError::Build` on any I/O, decode or store failure; the
    /// store transaction is rolled back.
    pub fn build<R: Read>(&mut self, reader: R) -> Result<u64> {
        let started = Instant::now();
        info!("Building name index");

        self.store.begin().map_err(into_build)?;
        let records = match self.load(reader) {
            Ok(records) => records,
            Err(e) => {
                if let Err(rollback) = self.store.rollback() {
                    warn!("Rollback after failed name index build failed: {}", rollback);
                }
                return Err(into_build(e));
            }
        };
        self.store.commit().map_err(into_build)?;
        self.store.optimize().map_err(into_build)?;

        info!(
            "Built name index: {} records in {:?}",
            records,
            started.elapsed()
        );
        Ok(records)
    }

    fn load<R: Read>(&mut self, reader: R) -> Result<u64> {
        let mut source = NameRecordReader::new(reader, self.config.buffer_size)?;
        debug!("Name source declares {} records", source.declared_count());
        self.store.clear()?;

        let batch_size = self.config.batch_size;
        let mut batch: Vec<NameSearchRecord> = Vec::with_capacity(batch_size);
        let mut total = 0u64;
        while let Some(record) = source.next_record()? {
            batch.push(record);
            if batch.len() == batch_size {
                self.flush(&mut batch, &mut total)?;
            }
        }
        self.flush(&mut batch, &mut total)?;

        if source.skipped() > 0 {
            warn!("Skipped {} name records with invalid UTF-8", source.skipped());
        }
        Ok(total)
    }

    fn flush(&mut self, batch: &mut Vec<NameSearchRecord>, total: &mut u64) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.store.insert_all(batch)?;
        *total += batch.len() as u64;
        debug!("Inserted {} name records ({} total)", batch.len(), total);
        batch.clear();
        Ok(())
    }

    /// Returns node ids whose names match `query`.
    ///
    /// A blank query returns no ids without querying the store.
    pub fn search(&self, query: &str) -> Result<Vec<NodeId>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.store.search(query)
    }

    /// Returns the search store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the settings store.
    pub fn settings(&self) -> &K {
        &self.settings
    }

    /// Returns the configuration.
    pub fn config(&self) -> &NameIndexConfig {
        &self.config
    }

    /// Splits the index into its stores.
    pub fn into_parts(self) -> (S, K) {
        (self.store, self.settings)
    }
}

fn into_build(err: GeodexError) -> GeodexError {
    match err {
        GeodexError::Build(_) => err,
        other => GeodexError::Build(other.to_string()),
    }
}
