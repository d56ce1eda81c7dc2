//! MemTable implementation
//!
//! Arena-backed skip list ordered by [`compare_key`].
//!
//! ```text
//! level 2: HEAD ──────────────► b@1 ─────────────────────► TAIL
//! level 1: HEAD ──► a@2 ──────► b@1 ──────────► c@5 ─────► TAIL
//! level 0: HEAD ──► a@2 ► a@1 ► b@1 ► b@0 ────► c@5 ─────► TAIL
//! ```
//!
//! Node 0 is the tail sentinel and node 1 the head sentinel; a forward
//! pointer equal to [`TAIL`] ends the chain at that level.

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::arena::{align8, Arena, Handle};
use super::{EntryRef, ARENA_SIZE, MAX_HEIGHT, MAX_KEY_SIZE};
use crate::key::{self, compare_key, VERSION_LEN};

const TAIL: u32 = 0;
const HEAD: u32 = 1;

/// One versioned entry. Only `next[..level]` is meaningful.
struct Node {
    key: Handle,
    value: Handle,
    level: usize,
    next: [u32; MAX_HEIGHT],
}

impl Node {
    fn new(key: Handle, value: Handle, level: usize) -> Self {
        Self {
            key,
            value,
            level,
            next: [TAIL; MAX_HEIGHT],
        }
    }
}

/// In-memory sorted multi-map over versioned keys
///
/// ## Concurrency:
/// None. Mutation takes `&mut self`; wrap in a lock if the table must be
/// shared between threads.
pub struct MemTable {
    arena: Arena,
    nodes: Vec<Node>,

    /// Value handle marking a tombstone (the reserved zero allocation)
    deleted: Handle,

    min_key: Handle,
    max_key: Handle,
    min_version: u64,
    max_version: u64,

    /// Tallest level of any node; levels at or above it are empty
    height: usize,
    rng: StdRng,
}

impl MemTable {
    /// Create an empty memtable with a randomly seeded level generator
    pub fn new() -> Self {
        Self::with_seed(rand::thread_rng().gen())
    }

    /// Create an empty memtable whose level selection is reproducible
    pub fn with_seed(seed: u64) -> Self {
        let mut arena = Arena::with_capacity(ARENA_SIZE);

        // The first 8 zero bytes back the null/tombstone handle.
        let reserved = arena.allocate(VERSION_LEN);
        debug_assert_eq!(reserved.map(Handle::offset), Some(0));

        let mut nodes = Vec::with_capacity(1024);
        nodes.push(Node::new(Handle::NULL, Handle::NULL, 0));
        nodes.push(Node::new(Handle::NULL, Handle::NULL, MAX_HEIGHT));

        Self {
            arena,
            nodes,
            deleted: Handle::NULL,
            min_key: Handle::NULL,
            max_key: Handle::NULL,
            min_version: u64::MAX,
            max_version: 0,
            height: 1,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    // =========================================================================
    // Public Operations
    // =========================================================================

    /// Newest value of `raw(key)` whose version is `<= version(key)`.
    ///
    /// Returns `None` for short keys, missing keys and tombstones.
    pub fn lookup(&self, key: &[u8]) -> Option<&[u8]> {
        self.find(key)?.value
    }

    /// Like [`lookup`](Self::lookup) but reports tombstones and the matched key
    pub fn find(&self, key: &[u8]) -> Option<EntryRef<'_>> {
        if key.len() < VERSION_LEN {
            return None;
        }

        let node = self.seek(key, None);
        if node == TAIL {
            return None;
        }

        let found = self.key_of(node);
        if key::raw_key(found) != key::raw_key(key) {
            return None;
        }

        Some(self.entry(node))
    }

    /// Insert `value` under the versioned `key`.
    ///
    /// Re-inserting an identical `raw || version` overwrites in place.
    /// Returns `false` for malformed keys or when the arena is full; state is
    /// left untouched in both cases.
    pub fn insert(&mut self, key: &[u8], value: &[u8]) -> bool {
        self.put(key, Some(value))
    }

    /// Record a tombstone for the versioned `key`
    pub fn delete(&mut self, key: &[u8]) -> bool {
        self.put(key, None)
    }

    /// Iterate entries in versioned-key order (tombstones included)
    pub fn iter(&self) -> MemTableIter<'_> {
        MemTableIter {
            table: self,
            node: self.nodes[HEAD as usize].next[0],
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of entries (tombstones included)
    pub fn len(&self) -> usize {
        self.nodes.len() - 2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Arena bytes reserved so far
    pub fn arena_used(&self) -> usize {
        self.arena.used()
    }

    /// Smallest versioned key inserted so far
    pub fn min_key(&self) -> Option<&[u8]> {
        self.bound_key(self.min_key)
    }

    /// Largest versioned key inserted so far
    pub fn max_key(&self) -> Option<&[u8]> {
        self.bound_key(self.max_key)
    }

    pub fn min_version(&self) -> Option<u64> {
        (!self.is_empty()).then_some(self.min_version)
    }

    pub fn max_version(&self) -> Option<u64> {
        (!self.is_empty()).then_some(self.max_version)
    }

    // =========================================================================
    // Skip List Internals
    // =========================================================================

    fn put(&mut self, key: &[u8], value: Option<&[u8]>) -> bool {
        if key.len() < VERSION_LEN || key.len() > MAX_KEY_SIZE {
            tracing::trace!(key_len = key.len(), "memtable rejected malformed key");
            return false;
        }
        if self.nodes.len() >= u32::MAX as usize {
            return false;
        }

        // Both allocations must fit before either is made.
        let needed = align8(key.len()) + value.map_or(0, |v| align8(v.len()));
        if needed > self.arena.remaining() {
            tracing::trace!(
                needed,
                remaining = self.arena.remaining(),
                "memtable arena exhausted"
            );
            return false;
        }

        let mut path = [HEAD; MAX_HEIGHT];
        let node = self.seek(key, Some(&mut path));

        let Some(key_handle) = self.arena.alloc_copy(key) else {
            return false;
        };
        let value_handle = match value {
            Some(v) => match self.arena.alloc_copy(v) {
                Some(handle) => handle,
                None => return false,
            },
            None => self.deleted,
        };

        if node != TAIL && compare_key(self.key_of(node), key) == Ordering::Equal {
            let existing = &mut self.nodes[node as usize];
            existing.key = key_handle;
            existing.value = value_handle;
        } else {
            let index = self.nodes.len() as u32;
            let mut new_node = Node::new(key_handle, value_handle, self.random_level());
            let level = new_node.level;

            // `path` above the current height still holds HEAD.
            for (i, &prev) in path.iter().enumerate().take(level) {
                new_node.next[i] = self.nodes[prev as usize].next[i];
            }
            self.nodes.push(new_node);
            for (i, &prev) in path.iter().enumerate().take(level) {
                self.nodes[prev as usize].next[i] = index;
            }
            self.height = self.height.max(level);
        }

        self.track_bounds(key_handle, key);
        true
    }

    /// Walk from the tallest used level down to level 0, stopping before the
    /// first node whose key is `>= key`. The predecessor at each level below
    /// `height` is recorded in `path`. Returns the first node `>= key`, or
    /// [`TAIL`].
    fn seek(&self, key: &[u8], mut path: Option<&mut [u32; MAX_HEIGHT]>) -> u32 {
        let mut node = HEAD;

        for level in (0..self.height).rev() {
            loop {
                let next = self.nodes[node as usize].next[level];
                if next == TAIL || compare_key(self.key_of(next), key) != Ordering::Less {
                    break;
                }
                node = next;
            }

            if let Some(path) = path.as_mut() {
                path[level] = node;
            }
        }

        self.nodes[node as usize].next[0]
    }

    /// Geometric level in `1..=MAX_HEIGHT`, P(level = k) = 2^-k
    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < MAX_HEIGHT && self.rng.gen::<bool>() {
            level += 1;
        }
        level
    }

    fn track_bounds(&mut self, handle: Handle, key: &[u8]) {
        let first = self.min_key.is_null();

        if first || compare_key(key, self.key_of_handle(self.min_key)) == Ordering::Less {
            self.min_key = handle;
        }
        if first || compare_key(key, self.key_of_handle(self.max_key)) == Ordering::Greater {
            self.max_key = handle;
        }

        let version = key::version(key);
        self.min_version = self.min_version.min(version);
        self.max_version = self.max_version.max(version);
    }

    fn bound_key(&self, handle: Handle) -> Option<&[u8]> {
        if handle.is_null() {
            return None;
        }
        self.arena.get(handle)
    }

    fn key_of(&self, node: u32) -> &[u8] {
        self.key_of_handle(self.nodes[node as usize].key)
    }

    fn key_of_handle(&self, handle: Handle) -> &[u8] {
        self.arena.get(handle).unwrap_or(&[])
    }

    fn entry(&self, node: u32) -> EntryRef<'_> {
        let node = &self.nodes[node as usize];
        let value = if node.value == self.deleted {
            None
        } else {
            Some(self.arena.get(node.value).unwrap_or(&[]))
        };

        EntryRef {
            key: self.key_of_handle(node.key),
            value,
        }
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over MemTable entries in versioned-key order
pub struct MemTableIter<'a> {
    table: &'a MemTable,
    node: u32,
}

impl<'a> Iterator for MemTableIter<'a> {
    type Item = EntryRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.node == TAIL {
            return None;
        }

        let entry = self.table.entry(self.node);
        self.node = self.table.nodes[self.node as usize].next[0];
        Some(entry)
    }
}
