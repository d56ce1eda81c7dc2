//! Table Module
//!
//! Immutable, sorted, checksummed on-disk representation of a memtable.
//!
//! ## File Format
//! All integers are little-endian. Every checksum is WyHash seeded with the
//! per-file `HashSeed` from the header, taken over the preceding bytes of the
//! same section.
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │ Header (32 bytes)                                                  │
//! │   Magic u64 | Version u32 | Flags u32 | HashSeed u64 | Checksum u64│
//! ├────────────────────────────────────────────────────────────────────┤
//! │ Data Block (repeated)                                              │
//! │   Flags u32 | BloomSize u32 | Bloom [BloomSize]                    │
//! │   Record*:                                                         │
//! │     KeyLen u32 | Key | Version u64 | Flags u32 | ValLen u32 | Val  │
//! │   Checksum u64                                                     │
//! ├────────────────────────────────────────────────────────────────────┤
//! │ Index Block                                                        │
//! │   Count u32 | { KeyLen u32 | Key | Version u64 | BlockOffset u64 }*│
//! ├────────────────────────────────────────────────────────────────────┤
//! │ Footer                                                             │
//! │   IndexOffset u64 | IndexSize u32 | MinVersion u64 | MaxVersion u64│
//! │   MinKeyLen u32 | MaxKeyLen u32 | MinKey | MaxKey                  │
//! │   FooterOffset u64 | Checksum u64 | FooterMagic u64                │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Record keys are raw keys; the version travels in its own field. A data
//! block ends where the next one (or the index block) begins.

mod bloom;
mod format;
mod iterator;
mod reader;
mod writer;

use bytes::Bytes;

pub use bloom::BloomFilter;
pub use iterator::TableIterator;
pub use reader::TableReader;
pub use writer::TableWriter;

// =============================================================================
// Shared Constants (used by writer, reader, iterator)
// =============================================================================

/// Magic number opening every table file
pub const MAGIC: u64 = 0xf3db_64e1_76e9_b2f5;

/// Magic number closing every table file
pub const FOOTER_MAGIC: u64 = 0xcf56_bff2_5a91_312a;

/// Current table format version
pub const FORMAT_VERSION: u32 = 10;

/// Upper bound on a single table file (20 MiB)
pub const MAX_TABLE_SIZE: u64 = 20 * 1024 * 1024;

/// Header size: Magic (8) + Version (4) + Flags (4) + Seed (8) + Checksum (8)
pub const HEADER_SIZE: usize = 32;

/// Trailing footer fields: FooterOffset (8) + Checksum (8) + FooterMagic (8)
pub(crate) const FOOTER_TAIL_SIZE: usize = 24;

/// Footer size without the min/max key bytes
pub(crate) const FOOTER_FIXED_SIZE: usize = 8 + 4 + 8 + 8 + 4 + 4 + FOOTER_TAIL_SIZE;

/// Block prefix: Flags (4) + BloomSize (4)
pub(crate) const BLOCK_HEADER_SIZE: usize = 8;

pub(crate) const CHECKSUM_SIZE: usize = 8;

/// Record framing: KeyLen (4) + Version (8) + Flags (4) + ValLen (4)
pub(crate) const RECORD_OVERHEAD: usize = 20;

/// Index entry framing: KeyLen (4) + Version (8) + BlockOffset (8)
pub(crate) const INDEX_ENTRY_OVERHEAD: usize = 20;

/// Data block flag: a bloom filter precedes the records
pub(crate) const BLOCK_FLAG_BLOOM: u32 = 1;

/// Record flag: the record is a tombstone
pub(crate) const RECORD_FLAG_TOMBSTONE: u32 = 1;

/// Seeded checksum used for every section of a table file
pub fn checksum(data: &[u8], seed: u64) -> u64 {
    wyhash::wyhash(data, seed)
}

// =============================================================================
// Writer Options
// =============================================================================

/// Layout options for [`TableWriter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableOptions {
    /// Record bytes after which the current data block is sealed
    pub block_size: usize,

    /// Bloom filter bits per key; 0 writes blocks without a filter
    pub bloom_bits_per_key: usize,

    /// Projected file size the writer refuses to exceed
    pub max_table_size: u64,
}

impl TableOptions {
    /// File size of a finished table holding exactly one record.
    ///
    /// A record whose lone table exceeds `max_table_size` can never be
    /// written.
    pub fn single_record_table_size(&self, raw_len: usize, value_len: usize) -> u64 {
        let block = BLOCK_HEADER_SIZE
            + BloomFilter::encoded_len_for(1, self.bloom_bits_per_key)
            + RECORD_OVERHEAD
            + raw_len
            + value_len
            + CHECKSUM_SIZE;
        let index = 4 + INDEX_ENTRY_OVERHEAD + raw_len;
        let footer = FOOTER_FIXED_SIZE + 2 * raw_len;
        (HEADER_SIZE + block + index + footer) as u64
    }
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            block_size: 4 * 1024,
            bloom_bits_per_key: 10,
            max_table_size: MAX_TABLE_SIZE,
        }
    }
}

// =============================================================================
// Table Metadata
// =============================================================================

/// Summary of a finished (or opened) table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    /// Number of records, tombstones included
    pub entry_count: u64,
    /// Number of data blocks
    pub block_count: u64,
    /// Smallest raw key (empty for an empty table)
    pub min_key: Vec<u8>,
    /// Largest raw key (empty for an empty table)
    pub max_key: Vec<u8>,
    pub min_version: u64,
    pub max_version: u64,
    /// File size in bytes
    pub file_size: u64,
    /// Per-file checksum seed
    pub hash_seed: u64,
}

impl TableMeta {
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Quick range check on a raw key.
    /// Returns false if the key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, raw: &[u8]) -> bool {
        self.entry_count > 0 && raw >= self.min_key.as_slice() && raw <= self.max_key.as_slice()
    }
}

// =============================================================================
// Table Entry
// =============================================================================

/// One record read back from a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    /// Raw key (no version suffix)
    pub key: Bytes,
    pub version: u64,
    /// `None` marks a tombstone
    pub value: Option<Bytes>,
}

impl TableEntry {
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Re-encode the versioned key (`raw || version`)
    pub fn versioned_key(&self) -> Vec<u8> {
        crate::key::key_at(&self.key, self.version)
    }
}
