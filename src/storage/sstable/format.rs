//! Byte-level codecs for the header, footer, index block and records.
//!
//! Decoding never panics: every read is length-checked and a short buffer
//! becomes [`InkError::Corruption`].

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{InkError, Result};

use super::{
    checksum, FOOTER_MAGIC, FOOTER_TAIL_SIZE, FORMAT_VERSION, HEADER_SIZE, MAGIC,
    RECORD_FLAG_TOMBSTONE,
};

// =============================================================================
// Decoder
// =============================================================================

/// Bounds-checked little-endian reader over a `Bytes` slice
pub(crate) struct Decoder {
    buf: Bytes,
    section: &'static str,
}

impl Decoder {
    pub(crate) fn new(buf: Bytes, section: &'static str) -> Self {
        Self { buf, section }
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(InkError::Corruption(format!(
                "{} truncated: need {} bytes, have {}",
                self.section,
                n,
                self.buf.remaining()
            )));
        }
        Ok(())
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64_le())
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<Bytes> {
        self.need(n)?;
        Ok(self.buf.split_to(n))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }
}

// =============================================================================
// Header
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub flags: u32,
    pub hash_seed: u64,
}

impl Header {
    pub(crate) fn encode(&self, out: &mut BytesMut) {
        let start = out.len();
        out.put_u64_le(MAGIC);
        out.put_u32_le(FORMAT_VERSION);
        out.put_u32_le(self.flags);
        out.put_u64_le(self.hash_seed);
        let sum = checksum(&out[start..], self.hash_seed);
        out.put_u64_le(sum);
    }

    /// Validate magic, checksum and format version, in that order
    pub(crate) fn decode(file: &Bytes) -> Result<Self> {
        if file.len() < HEADER_SIZE {
            return Err(InkError::Corruption("file shorter than header".to_string()));
        }

        let mut dec = Decoder::new(file.slice(..HEADER_SIZE), "header");
        let magic = dec.u64()?;
        if magic != MAGIC {
            return Err(InkError::Corruption(format!("bad header magic {:#018x}", magic)));
        }

        let version = dec.u32()?;
        let flags = dec.u32()?;
        let hash_seed = dec.u64()?;
        let stored = dec.u64()?;

        let expected = checksum(&file[..HEADER_SIZE - 8], hash_seed);
        if stored != expected {
            return Err(InkError::Corruption("header checksum mismatch".to_string()));
        }

        if version != FORMAT_VERSION {
            return Err(InkError::UnsupportedVersion(version));
        }

        Ok(Self { flags, hash_seed })
    }
}

// =============================================================================
// Footer
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Footer {
    pub index_offset: u64,
    pub index_size: u32,
    pub min_version: u64,
    pub max_version: u64,
    pub min_key: Bytes,
    pub max_key: Bytes,
    pub footer_offset: u64,
}

impl Footer {
    pub(crate) fn encode(&self, out: &mut BytesMut, seed: u64) {
        let start = out.len();
        out.put_u64_le(self.index_offset);
        out.put_u32_le(self.index_size);
        out.put_u64_le(self.min_version);
        out.put_u64_le(self.max_version);
        out.put_u32_le(self.min_key.len() as u32);
        out.put_u32_le(self.max_key.len() as u32);
        out.put_slice(&self.min_key);
        out.put_slice(&self.max_key);
        out.put_u64_le(self.footer_offset);
        let sum = checksum(&out[start..], seed);
        out.put_u64_le(sum);
        out.put_u64_le(FOOTER_MAGIC);
    }

    /// Locate the footer from the end of the file and validate it
    pub(crate) fn decode(file: &Bytes, seed: u64) -> Result<Self> {
        let len = file.len();
        if len < HEADER_SIZE + FOOTER_TAIL_SIZE {
            return Err(InkError::Corruption("file shorter than header + footer".to_string()));
        }

        let mut tail = Decoder::new(file.slice(len - FOOTER_TAIL_SIZE..), "footer tail");
        let footer_offset = tail.u64()?;
        let stored = tail.u64()?;
        let magic = tail.u64()?;

        if magic != FOOTER_MAGIC {
            return Err(InkError::Corruption(format!("bad footer magic {:#018x}", magic)));
        }

        let checked_end = len - 16;
        let start = usize::try_from(footer_offset)
            .ok()
            .filter(|&off| {
                off >= HEADER_SIZE && off.checked_add(8).is_some_and(|end| end <= checked_end)
            })
            .ok_or_else(|| {
                InkError::Corruption(format!("footer offset {} out of range", footer_offset))
            })?;

        if checksum(&file[start..checked_end], seed) != stored {
            return Err(InkError::Corruption("footer checksum mismatch".to_string()));
        }

        let mut dec = Decoder::new(file.slice(start..checked_end), "footer");
        let index_offset = dec.u64()?;
        let index_size = dec.u32()?;
        let min_version = dec.u64()?;
        let max_version = dec.u64()?;
        let min_key_len = dec.u32()? as usize;
        let max_key_len = dec.u32()? as usize;
        let min_key = dec.bytes(min_key_len)?;
        let max_key = dec.bytes(max_key_len)?;
        let recorded_offset = dec.u64()?;

        if recorded_offset != footer_offset || !dec.is_empty() {
            return Err(InkError::Corruption("footer layout mismatch".to_string()));
        }

        Ok(Self {
            index_offset,
            index_size,
            min_version,
            max_version,
            min_key,
            max_key,
            footer_offset,
        })
    }
}

// =============================================================================
// Index Block
// =============================================================================

/// First key of a data block and where the block starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IndexEntry {
    pub key: Bytes,
    pub version: u64,
    pub block_offset: u64,
}

pub(crate) fn encode_index(entries: &[IndexEntry], out: &mut BytesMut) {
    out.put_u32_le(entries.len() as u32);
    for entry in entries {
        out.put_u32_le(entry.key.len() as u32);
        out.put_slice(&entry.key);
        out.put_u64_le(entry.version);
        out.put_u64_le(entry.block_offset);
    }
}

pub(crate) fn decode_index(block: Bytes) -> Result<Vec<IndexEntry>> {
    let mut dec = Decoder::new(block, "index block");
    let count = dec.u32()? as usize;

    // Each entry needs at least 20 bytes; reject counts the block cannot hold.
    if count > dec.remaining() / super::INDEX_ENTRY_OVERHEAD {
        return Err(InkError::Corruption(format!("index count {} too large", count)));
    }

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let key_len = dec.u32()? as usize;
        let key = dec.bytes(key_len)?;
        let version = dec.u64()?;
        let block_offset = dec.u64()?;
        entries.push(IndexEntry {
            key,
            version,
            block_offset,
        });
    }

    if !dec.is_empty() {
        return Err(InkError::Corruption("trailing bytes in index block".to_string()));
    }

    Ok(entries)
}

// =============================================================================
// Records
// =============================================================================

pub(crate) fn encode_record(out: &mut BytesMut, raw: &[u8], version: u64, value: Option<&[u8]>) {
    let (flags, value) = match value {
        Some(v) => (0, v),
        None => (RECORD_FLAG_TOMBSTONE, &[][..]),
    };

    out.put_u32_le(raw.len() as u32);
    out.put_slice(raw);
    out.put_u64_le(version);
    out.put_u32_le(flags);
    out.put_u32_le(value.len() as u32);
    out.put_slice(value);
}

/// Decoded record: (raw key, version, value or tombstone)
pub(crate) type Record = (Bytes, u64, Option<Bytes>);

pub(crate) fn decode_record(dec: &mut Decoder) -> Result<Record> {
    let key_len = dec.u32()? as usize;
    let key = dec.bytes(key_len)?;
    let version = dec.u64()?;
    let flags = dec.u32()?;
    let val_len = dec.u32()? as usize;
    let value = dec.bytes(val_len)?;

    let value = if flags & RECORD_FLAG_TOMBSTONE != 0 {
        None
    } else {
        Some(value)
    };

    Ok((key, version, value))
}
