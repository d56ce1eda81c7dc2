//! MemTable Module
//!
//! In-memory sorted multi-map over versioned keys.
//!
//! ## Responsibilities
//! - Fast inserts, point lookups and tombstone deletes in memory
//! - Snapshot reads: `lookup(key_at(raw, V))` sees the newest version `<= V`
//! - Track min/max key and version for the table footer
//! - Ordered iteration for table creation
//!
//! ## Data Structure Choice
//! A skip list whose nodes live in an append-only `Vec` and whose keys and
//! values live in a fixed 8 MiB [`Arena`]:
//! - Nodes reference each other by index, bytes are referenced by [`Handle`]
//! - Deletion is logical (tombstone); space is reclaimed by dropping the
//!   whole memtable after a flush
//! - Not internally synchronized: one owner at a time
//!
//! A failed `insert`/`delete` means "flush and start a fresh memtable".

mod arena;
mod table;

pub use arena::{Arena, Handle};
pub use table::{MemTable, MemTableIter};

/// Maximum skip list height
pub const MAX_HEIGHT: usize = 32;

/// Capacity of the memtable arena (8 MiB)
pub const ARENA_SIZE: usize = 8 * 1024 * 1024;

/// Maximum versioned key size, suffix included (1 MiB)
pub const MAX_KEY_SIZE: usize = 1024 * 1024;

/// A borrowed view of one memtable entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRef<'a> {
    /// Full versioned key (`raw || version`)
    pub key: &'a [u8],

    /// Stored value, or `None` for a tombstone
    pub value: Option<&'a [u8]>,
}

impl<'a> EntryRef<'a> {
    /// Key with the version suffix stripped
    pub fn raw_key(&self) -> &'a [u8] {
        crate::key::raw_key(self.key)
    }

    /// Version of this entry
    pub fn version(&self) -> u64 {
        crate::key::version(self.key)
    }

    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }
}
