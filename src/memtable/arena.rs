//! Bump-pointer byte arena
//!
//! Fixed-capacity buffer; allocations are 8-byte aligned and never freed
//! individually.

/// Opaque reference into an [`Arena`]: 32-bit offset in the high half,
/// 32-bit length in the low half. `0` is the null handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Handle(u64);

impl Handle {
    /// Null / "no allocation" handle (offset 0, length 0)
    pub const NULL: Handle = Handle(0);

    pub fn new(offset: u32, len: u32) -> Self {
        Handle((offset as u64) << 32 | len as u64)
    }

    pub fn from_raw(raw: u64) -> Self {
        Handle(raw)
    }

    pub fn as_raw(self) -> u64 {
        self.0
    }

    pub fn offset(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub fn len(self) -> u32 {
        self.0 as u32
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Round `size` up to the next multiple of 8
pub(crate) fn align8(size: usize) -> usize {
    (size + 7) & !7
}

/// Fixed-capacity byte buffer with a monotonically advancing bump pointer
pub struct Arena {
    buf: Vec<u8>,
    head: usize,
}

impl Arena {
    /// Create an arena of `capacity` zeroed bytes.
    ///
    /// Capacity is clamped to `u32::MAX` so every offset fits in a handle.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(u32::MAX as usize);
        Self {
            buf: vec![0u8; capacity],
            head: 0,
        }
    }

    /// Reserve `align8(size)` bytes. Returns `None` when the request does not
    /// fit in the remaining capacity.
    pub fn allocate(&mut self, size: usize) -> Option<Handle> {
        let aligned = align8(size);
        let len = u32::try_from(size).ok()?;

        if aligned > self.remaining() {
            return None;
        }

        let offset = self.head as u32;
        self.head += aligned;
        Some(Handle::new(offset, len))
    }

    /// Allocate and copy `data` into the arena
    pub fn alloc_copy(&mut self, data: &[u8]) -> Option<Handle> {
        let handle = self.allocate(data.len())?;
        let start = handle.offset() as usize;
        self.buf[start..start + data.len()].copy_from_slice(data);
        Some(handle)
    }

    /// Resolve a handle. Out-of-range handles resolve to `None`.
    pub fn get(&self, handle: Handle) -> Option<&[u8]> {
        let offset = handle.offset() as usize;
        let end = offset.checked_add(handle.len() as usize)?;

        if offset > self.buf.len() || end > self.buf.len() {
            return None;
        }

        Some(&self.buf[offset..end])
    }

    /// Bytes reserved so far (alignment padding included)
    pub fn used(&self) -> usize {
        self.head
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.head
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}
