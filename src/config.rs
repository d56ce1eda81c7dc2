//! Configuration for inkstore
//!
//! Centralized configuration with sensible defaults. Capacity limits of the
//! memtable are compile-time constants (see [`crate::memtable`]); only the
//! on-disk table layout and the storage location are tunable.

use std::path::PathBuf;

use crate::error::{InkError, Result};
use crate::storage::sstable::{TableOptions, HEADER_SIZE, MAX_TABLE_SIZE};

/// Main configuration for an inkstore instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── tables/          (table_NNNNNN.sst files)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // Table Configuration
    // -------------------------------------------------------------------------
    /// Record budget of a single data block (in bytes)
    pub block_size: usize,

    /// Bloom filter bits per key; 0 disables bloom filters
    pub bloom_bits_per_key: usize,

    /// Upper bound on the size of a single table file (in bytes)
    pub max_table_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./inkstore_data"),
            block_size: 4 * 1024, // 4 KiB
            bloom_bits_per_key: 10,
            max_table_size: MAX_TABLE_SIZE,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the configured limits against the format constants
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(InkError::Config("block_size must be non-zero".to_string()));
        }

        if self.max_table_size <= HEADER_SIZE as u64 || self.max_table_size > MAX_TABLE_SIZE {
            return Err(InkError::Config(format!(
                "max_table_size must be in ({}, {}], got {}",
                HEADER_SIZE, MAX_TABLE_SIZE, self.max_table_size
            )));
        }

        Ok(())
    }

    /// Table writer options derived from this config
    pub fn table_options(&self) -> TableOptions {
        TableOptions {
            block_size: self.block_size,
            bloom_bits_per_key: self.bloom_bits_per_key,
            max_table_size: self.max_table_size,
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the data block size (in bytes)
    pub fn block_size(mut self, size: usize) -> Self {
        self.config.block_size = size;
        self
    }

    /// Set the bloom filter density; 0 disables bloom filters
    pub fn bloom_bits_per_key(mut self, bits: usize) -> Self {
        self.config.bloom_bits_per_key = bits;
        self
    }

    /// Set the maximum table size (in bytes)
    pub fn max_table_size(mut self, size: u64) -> Self {
        self.config.max_table_size = size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
