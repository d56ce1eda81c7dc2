//! Engine Module
//!
//! Coordinates the active memtable and the table files.
//!
//! ## Responsibilities
//! - Turn `(raw, version)` pairs into versioned keys
//! - Own the single active memtable (external synchronization for it)
//! - Flush to a new table when the memtable arena is exhausted
//! - Answer snapshot reads across memtable and tables

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{InkError, Result};
use crate::key;
use crate::memtable::MemTable;
use crate::storage::{StorageManager, TableMeta};

/// The main storage engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - The memtable is not internally synchronized, so every access to it
///   (reads included) goes through `memtable`'s mutex
/// - Table lookups run under the storage manager's read lock
/// - A flush holds the memtable mutex for its whole duration, so a write
///   never races with the table it is being flushed into
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Directory holding the table files
    storage_dir: PathBuf,

    /// Active memtable
    memtable: Mutex<MemTable>,

    /// Persistent storage manager (internal RwLock on tables vec)
    storage: StorageManager,
}

/// Winner between a memtable hit and a table hit
struct Candidate {
    version: u64,
    value: Option<Vec<u8>>,
}

impl Engine {
    const TABLE_DIR: &'static str = "tables";

    /// Open or create an engine with the given config
    ///
    /// On startup:
    /// 1. Validate config
    /// 2. Create data and table directories
    /// 3. Load and validate existing tables
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        fs::create_dir_all(&config.data_dir)?;
        let storage_dir = config.data_dir.join(Self::TABLE_DIR);

        let storage = StorageManager::open(&storage_dir, config.table_options())?;

        tracing::info!(data_dir = %config.data_dir.display(), "engine opened");

        Ok(Self {
            config,
            storage_dir,
            memtable: Mutex::new(MemTable::new()),
            storage,
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    /// Newest live value of `raw` as of `version`
    ///
    /// Search order: memtable, then every table; the highest version `<=`
    /// the requested one wins, and a winning tombstone reads as absent.
    pub fn get(&self, raw: &[u8], version: u64) -> Result<Option<Vec<u8>>> {
        let lookup = key::key_at(raw, version);

        let from_memtable = {
            let memtable = self.memtable.lock();
            memtable.find(&lookup).map(|entry| Candidate {
                version: entry.version(),
                value: entry.value.map(<[u8]>::to_vec),
            })
        };

        let from_tables = self.storage.get(&lookup)?.map(|entry| Candidate {
            version: entry.version,
            value: entry.value.map(|v| v.to_vec()),
        });

        let winner = match (from_memtable, from_tables) {
            (Some(m), Some(t)) => Some(if t.version > m.version { t } else { m }),
            (m, t) => m.or(t),
        };

        Ok(winner.and_then(|c| c.value))
    }

    /// Store `value` for `raw` at `version`
    pub fn put(&self, raw: &[u8], version: u64, value: &[u8]) -> Result<()> {
        let versioned = key::key_at(raw, version);
        self.write(&versioned, Some(value))
    }

    /// Record a tombstone for `raw` at `version`
    pub fn delete(&self, raw: &[u8], version: u64) -> Result<()> {
        let versioned = key::key_at(raw, version);
        self.write(&versioned, None)
    }

    /// Flush the memtable to new tables (no-op when empty)
    ///
    /// Returns the metadata of every table written, oldest first.
    pub fn flush(&self) -> Result<Vec<TableMeta>> {
        let mut memtable = self.memtable.lock();
        self.flush_locked(&mut memtable)
    }

    /// Close the engine gracefully, flushing any pending writes
    pub fn close(self) -> Result<()> {
        self.flush()?;
        tracing::info!(tables = self.storage.table_count(), "engine closed");
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// Get the storage directory path (where tables are stored)
    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Get the memtable entry count
    pub fn memtable_entry_count(&self) -> usize {
        self.memtable.lock().len()
    }

    /// Get the number of tables
    pub fn table_count(&self) -> usize {
        self.storage.table_count()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn write(&self, versioned: &[u8], value: Option<&[u8]>) -> Result<()> {
        if versioned.len() > crate::memtable::MAX_KEY_SIZE {
            return Err(InkError::InvalidKey(format!(
                "key of {} bytes exceeds the {} byte limit",
                versioned.len(),
                crate::memtable::MAX_KEY_SIZE
            )));
        }

        // Every entry must fit a table on its own, or a full memtable could
        // never be flushed.
        let options = self.config.table_options();
        let lone = options.single_record_table_size(
            key::raw_key(versioned).len(),
            value.map_or(0, <[u8]>::len),
        );
        if lone > options.max_table_size {
            return Err(InkError::TableFull {
                limit: options.max_table_size,
            });
        }

        let mut memtable = self.memtable.lock();
        if apply(&mut memtable, versioned, value) {
            return Ok(());
        }

        // A fresh memtable is the only way to reclaim arena space.
        if memtable.is_empty() {
            return Err(InkError::CapacityExhausted);
        }
        tracing::debug!(entries = memtable.len(), "memtable full, flushing");
        self.flush_locked(&mut memtable)?;

        if apply(&mut memtable, versioned, value) {
            Ok(())
        } else {
            Err(InkError::CapacityExhausted)
        }
    }

    fn flush_locked(&self, memtable: &mut MemTable) -> Result<Vec<TableMeta>> {
        if memtable.is_empty() {
            return Ok(Vec::new());
        }

        let metas = self.storage.flush(memtable)?;
        *memtable = MemTable::new();
        Ok(metas)
    }
}

fn apply(memtable: &mut MemTable, key: &[u8], value: Option<&[u8]>) -> bool {
    match value {
        Some(v) => memtable.insert(key, v),
        None => memtable.delete(key),
    }
}
