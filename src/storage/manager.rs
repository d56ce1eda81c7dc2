//! Storage Manager
//!
//! Manages the table files of one data directory.
//!
//! ## Responsibilities
//! - Discover existing tables on startup
//! - Create new tables from memtable flushes
//! - Answer point reads across all tables (highest matching version wins)

use std::fs::{self, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::{InkError, Result};
use crate::memtable::MemTable;

use super::sstable::{TableEntry, TableMeta, TableOptions, TableReader, TableWriter};

/// Extension of a table that is still being written
const TMP_EXTENSION: &str = "tmp";

/// Manages the storage layer
///
/// ## Concurrency:
/// - `tables`: Protected by RwLock (many concurrent readers, exclusive writer)
/// - `next_table_id`: Atomic counter (lock-free)
/// - Readers are immutable, so lookups only take the read lock
pub struct StorageManager {
    /// Directory where tables are stored
    data_dir: PathBuf,

    /// Layout options for new tables
    options: TableOptions,

    /// Open table readers, ordered newest → oldest
    tables: RwLock<Vec<TableReader>>,

    /// Next ID for creating new tables
    next_table_id: AtomicU64,
}

impl StorageManager {
    /// Open or create storage in the given directory
    ///
    /// On startup:
    /// 1. Create directory if it doesn't exist
    /// 2. Discover existing table files
    /// 3. Remove unfinished `.tmp` tables left by an interrupted flush
    /// 4. Open and validate a reader for each
    /// 5. Order by ID descending (newest first)
    pub fn open(path: &Path, options: TableOptions) -> Result<Self> {
        fs::create_dir_all(path)?;

        let mut table_ids: Vec<u64> = Vec::new();
        for entry in fs::read_dir(path)? {
            let file_path = entry?.path();
            if !file_path.is_file() {
                continue;
            }
            if file_path.extension().is_some_and(|ext| ext == TMP_EXTENSION) {
                // Left behind by an interrupted flush; never renamed into place.
                tracing::warn!(path = %file_path.display(), "removing unfinished table");
                fs::remove_file(&file_path)?;
            } else if let Some(id) = Self::parse_table_id(&file_path) {
                table_ids.push(id);
            }
        }

        // Newest (highest ID) first
        table_ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut tables = Vec::with_capacity(table_ids.len());
        for id in &table_ids {
            tables.push(TableReader::open(&Self::table_path_with_dir(path, *id))?);
        }

        let next_id = table_ids.first().map(|&id| id + 1).unwrap_or(1);

        tracing::info!(
            dir = %path.display(),
            tables = tables.len(),
            next_id,
            "storage opened"
        );

        Ok(Self {
            data_dir: path.to_path_buf(),
            options,
            tables: RwLock::new(tables),
            next_table_id: AtomicU64::new(next_id),
        })
    }

    /// Newest entry for `raw(key)` with version `<= version(key)` across all
    /// tables. Tombstones are returned so callers can shadow older data.
    pub fn get(&self, key: &[u8]) -> Result<Option<TableEntry>> {
        let tables = self.tables.read();
        let raw = crate::key::raw_key(key);

        let mut best: Option<TableEntry> = None;
        for reader in tables.iter() {
            // Skip table if key is outside its range (O(1) check)
            if !reader.might_contain(raw) {
                continue;
            }

            if let Some(entry) = reader.get(key)? {
                if best.as_ref().map_or(true, |b| entry.version > b.version) {
                    best = Some(entry);
                }
            }
        }

        Ok(best)
    }

    /// Flush a memtable into one or more new tables
    ///
    /// Entries (tombstones included) are written in memtable order. A run is
    /// split into another table whenever it reaches `max_table_size`. Every
    /// table is written under a temporary name, synced, and only renamed into
    /// place once the whole memtable is on disk; on failure the temporary
    /// files are removed and no table becomes visible.
    pub fn flush(&self, memtable: &MemTable) -> Result<Vec<TableMeta>> {
        if memtable.is_empty() {
            return Err(InkError::Storage("Cannot flush empty MemTable".to_string()));
        }

        let mut written: Vec<(u64, PathBuf)> = Vec::new();
        let result = self.write_runs(memtable, &mut written);
        let metas = match result {
            Ok(metas) => metas,
            Err(e) => {
                for (_, tmp) in &written {
                    let _ = fs::remove_file(tmp);
                }
                tracing::warn!(error = %e, "flush failed, discarded partial tables");
                return Err(e);
            }
        };

        let mut readers = Vec::with_capacity(written.len());
        for (id, tmp) in &written {
            let path = self.table_path(*id);
            fs::rename(tmp, &path)?;
            readers.push(TableReader::open(&path)?);
        }

        let mut tables = self.tables.write();
        for reader in readers {
            tables.insert(0, reader);
        }
        drop(tables);

        for ((id, _), meta) in written.iter().zip(&metas) {
            tracing::info!(
                table_id = id,
                entries = meta.entry_count,
                blocks = meta.block_count,
                bytes = meta.file_size,
                "flushed memtable"
            );
        }

        Ok(metas)
    }

    /// Get the number of tables
    pub fn table_count(&self) -> usize {
        self.tables.read().len()
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the next table ID (for testing/debugging)
    pub fn next_table_id(&self) -> u64 {
        self.next_table_id.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Write the memtable as consecutive size-capped runs, recording each
    /// temporary file in `written` as soon as it is created
    fn write_runs(
        &self,
        memtable: &MemTable,
        written: &mut Vec<(u64, PathBuf)>,
    ) -> Result<Vec<TableMeta>> {
        let mut entries = memtable.iter().peekable();
        let mut metas = Vec::new();

        while entries.peek().is_some() {
            let id = self.next_table_id.fetch_add(1, Ordering::SeqCst);
            let tmp = self.table_path(id).with_extension(TMP_EXTENSION);

            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            written.push((id, tmp.clone()));

            let mut writer = TableWriter::new(BufWriter::new(file), self.options);
            writer.write_header()?;
            while let Some(entry) = entries.peek() {
                match writer.add(entry.key, entry.value) {
                    Ok(()) => {
                        entries.next();
                    }
                    // Table is full: close it and continue in the next one.
                    Err(InkError::TableFull { .. }) if writer.entry_count() > 0 => break,
                    Err(e) => return Err(e),
                }
            }
            metas.push(writer.finish()?);

            let file = writer.into_inner().into_inner().map_err(|e| {
                InkError::Storage(format!("Failed to flush table {}: {}", tmp.display(), e))
            })?;
            file.sync_all()?;
        }

        Ok(metas)
    }

    fn table_path(&self, id: u64) -> PathBuf {
        Self::table_path_with_dir(&self.data_dir, id)
    }

    fn table_path_with_dir(dir: &Path, id: u64) -> PathBuf {
        dir.join(format!("table_{:06}.sst", id))
    }

    /// "table_000042.sst" → Some(42)
    fn parse_table_id(path: &Path) -> Option<u64> {
        if path.extension()? != "sst" {
            return None;
        }
        let name = path.file_stem()?.to_string_lossy();
        let id_str = name.strip_prefix("table_")?;
        id_str.parse().ok()
    }
}
