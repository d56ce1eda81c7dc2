//! Storage Module
//!
//! Persistent storage layer: immutable, checksummed table files.
//!
//! ## Responsibilities
//! - Serialize a sorted run of versioned entries to disk
//! - Validate and serve point lookups / scans from table files
//! - Flush memtables into new tables and search tables newest → oldest
//!
//! ## File Layout (see [`sstable`] for byte-level detail)
//! ```text
//! ┌────────────────────────────────────────┐
//! │ Header (32 bytes, checksummed)         │
//! ├────────────────────────────────────────┤
//! │ Data Block 0..N (bloom + records + cs) │
//! ├────────────────────────────────────────┤
//! │ Index Block (first key of each block)  │
//! ├────────────────────────────────────────┤
//! │ Footer (bounds, checksum, magic)       │
//! └────────────────────────────────────────┘
//! ```
//!
//! Compaction and multi-table merges are not implemented.

pub mod sstable;
mod manager;

pub use sstable::{TableEntry, TableIterator, TableMeta, TableOptions, TableReader, TableWriter};
pub use manager::StorageManager;
