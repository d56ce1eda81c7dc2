//! Table Reader
//!
//! Loads a table file into memory, validates every checksum up front and
//! serves MVCC point lookups through the index block.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use bytes::{Buf, Bytes};

use crate::error::{InkError, Result};
use crate::key::{self, VERSION_LEN};

use super::bloom::BloomFilter;
use super::format::{decode_index, decode_record, Decoder, Footer, Header, IndexEntry};
use super::iterator::TableIterator;
use super::{
    checksum, TableEntry, TableMeta, BLOCK_FLAG_BLOOM, BLOCK_HEADER_SIZE, CHECKSUM_SIZE,
    HEADER_SIZE, MAX_TABLE_SIZE,
};

/// A validated data block
pub(super) struct Block {
    pub first_key: Bytes,
    pub first_version: u64,
    pub bloom: Option<BloomFilter>,
    /// Record bytes (block prefix, bloom and checksum stripped)
    pub records: Bytes,
}

/// Reader for table files
///
/// Immutable once opened, so `&self` lookups may run from many threads.
pub struct TableReader {
    hash_seed: u64,
    flags: u32,
    blocks: Vec<Block>,
    meta: TableMeta,
}

impl TableReader {
    /// Open and validate a table file
    pub fn open(path: &Path) -> Result<Self> {
        let file_size = fs::metadata(path)?.len();
        if file_size > MAX_TABLE_SIZE {
            return Err(InkError::Corruption(format!(
                "{} is {} bytes, larger than the {} byte table limit",
                path.display(),
                file_size,
                MAX_TABLE_SIZE
            )));
        }

        let data = fs::read(path)?;
        Self::from_bytes(Bytes::from(data)).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "rejected table file");
            e
        })
    }

    /// Validate an in-memory table image.
    ///
    /// Any checksum or layout failure rejects the whole image.
    pub fn from_bytes(file: Bytes) -> Result<Self> {
        let header = Header::decode(&file)?;
        let seed = header.hash_seed;
        let footer = Footer::decode(&file, seed)?;

        let index_start = footer.index_offset;
        let index_end = index_start.checked_add(footer.index_size as u64);
        if index_start < HEADER_SIZE as u64 || index_end != Some(footer.footer_offset) {
            return Err(InkError::Corruption(format!(
                "index block at {} (+{}) does not end at footer offset {}",
                index_start, footer.index_size, footer.footer_offset
            )));
        }
        let index_end = footer.footer_offset;

        let index = decode_index(file.slice(index_start as usize..index_end as usize))?;
        let blocks = Self::load_blocks(&file, &index, index_start as usize, seed)?;

        let entry_count = blocks
            .iter()
            .map(|b| count_records(&b.records))
            .sum::<Result<u64>>()?;

        let meta = TableMeta {
            entry_count,
            block_count: blocks.len() as u64,
            min_key: footer.min_key.to_vec(),
            max_key: footer.max_key.to_vec(),
            min_version: footer.min_version,
            max_version: footer.max_version,
            file_size: file.len() as u64,
            hash_seed: seed,
        };

        tracing::debug!(
            entries = meta.entry_count,
            blocks = meta.block_count,
            file_size = meta.file_size,
            "opened table"
        );

        Ok(Self {
            hash_seed: seed,
            flags: header.flags,
            blocks,
            meta,
        })
    }

    /// Blocks must tile `[HEADER_SIZE, index_start)` in index order, and each
    /// must open with the record its index entry names
    fn load_blocks(
        file: &Bytes,
        index: &[IndexEntry],
        index_start: usize,
        seed: u64,
    ) -> Result<Vec<Block>> {
        if index.is_empty() && index_start != HEADER_SIZE {
            return Err(InkError::Corruption("data region without index entries".to_string()));
        }

        let mut blocks = Vec::with_capacity(index.len());
        for (i, entry) in index.iter().enumerate() {
            let start = entry.block_offset as usize;
            let end = match index.get(i + 1) {
                Some(next) => next.block_offset as usize,
                None => index_start,
            };

            let expected_start = if i == 0 { HEADER_SIZE } else { start };
            if start != expected_start
                || end > index_start
                || end < start + BLOCK_HEADER_SIZE + CHECKSUM_SIZE
            {
                return Err(InkError::Corruption(format!(
                    "data block {} has invalid bounds [{}, {})",
                    i, start, end
                )));
            }

            let body_end = end - CHECKSUM_SIZE;
            let mut stored = &file[body_end..end];
            if checksum(&file[start..body_end], seed) != stored.get_u64_le() {
                return Err(InkError::Corruption(format!(
                    "data block {} checksum mismatch",
                    i
                )));
            }

            let mut dec = Decoder::new(file.slice(start..body_end), "data block");
            let flags = dec.u32()?;
            let bloom_size = dec.u32()? as usize;
            let bloom_blob = dec.bytes(bloom_size)?;
            let bloom = if flags & BLOCK_FLAG_BLOOM != 0 && bloom_size > 0 {
                Some(BloomFilter::decode(bloom_blob)?)
            } else {
                None
            };
            let records = dec.bytes(dec.remaining())?;

            // The index carries no checksum; its keys must agree with the blocks.
            let (first_key, first_version, _) =
                decode_record(&mut Decoder::new(records.clone(), "record"))?;
            if first_key != entry.key || first_version != entry.version {
                return Err(InkError::Corruption(format!(
                    "index entry {} does not match the first record of its block",
                    i
                )));
            }

            blocks.push(Block {
                first_key: entry.key.clone(),
                first_version: entry.version,
                bloom,
                records,
            });
        }

        Ok(blocks)
    }

    /// Newest entry for `raw(key)` with version `<= version(key)`.
    ///
    /// Returns `Ok(None)` when no such version exists; tombstones are
    /// returned as entries with `value == None`.
    pub fn get(&self, key: &[u8]) -> Result<Option<TableEntry>> {
        if key.len() < VERSION_LEN || self.blocks.is_empty() {
            return Ok(None);
        }
        let raw = key::raw_key(key);
        let version = key::version(key);
        if !self.meta.might_contain(raw) {
            return Ok(None);
        }

        // Last block whose first key is <= the search key.
        let after = self.blocks.partition_point(|b| {
            key::compare_parts(&b.first_key, b.first_version, raw, version) != Ordering::Greater
        });
        let block = after.saturating_sub(1);

        // The answer is the first record >= key: either inside `block` or the
        // first record of the next block.
        let in_block = self.blocks[block]
            .bloom
            .as_ref()
            .map_or(true, |bloom| bloom.may_contain(raw, self.hash_seed));
        let next_starts_with_raw = self
            .blocks
            .get(block + 1)
            .is_some_and(|b| b.first_key.as_ref() == raw);

        if !in_block && !next_starts_with_raw {
            return Ok(None);
        }

        let candidate = match self.seek_in_block(block, raw, version)? {
            Some(entry) => Some(entry),
            None if block + 1 < self.blocks.len() => self.first_record(block + 1)?,
            None => None,
        };

        Ok(candidate.filter(|entry| entry.key.as_ref() == raw))
    }

    /// Convenience wrapper returning only live values
    pub fn lookup(&self, key: &[u8]) -> Result<Option<Bytes>> {
        Ok(self.get(key)?.and_then(|entry| entry.value))
    }

    /// Iterate over every record in file order
    pub fn iter(&self) -> TableIterator<'_> {
        TableIterator::new(&self.blocks)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    pub fn entry_count(&self) -> u64 {
        self.meta.entry_count
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn hash_seed(&self) -> u64 {
        self.hash_seed
    }

    /// Header flags (reserved, currently always 0)
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Quick range check on a raw key
    pub fn might_contain(&self, raw: &[u8]) -> bool {
        self.meta.might_contain(raw)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn seek_in_block(&self, block: usize, raw: &[u8], version: u64) -> Result<Option<TableEntry>> {
        let mut dec = Decoder::new(self.blocks[block].records.clone(), "record");
        while !dec.is_empty() {
            let (key, entry_version, value) = decode_record(&mut dec)?;
            if key::compare_parts(&key, entry_version, raw, version) != Ordering::Less {
                return Ok(Some(TableEntry {
                    key,
                    version: entry_version,
                    value,
                }));
            }
        }
        Ok(None)
    }

    fn first_record(&self, block: usize) -> Result<Option<TableEntry>> {
        let mut dec = Decoder::new(self.blocks[block].records.clone(), "record");
        if dec.is_empty() {
            return Ok(None);
        }
        let (key, version, value) = decode_record(&mut dec)?;
        Ok(Some(TableEntry {
            key,
            version,
            value,
        }))
    }
}

fn count_records(records: &Bytes) -> Result<u64> {
    let mut dec = Decoder::new(records.clone(), "record");
    let mut count = 0;
    while !dec.is_empty() {
        decode_record(&mut dec)?;
        count += 1;
    }
    Ok(count)
}
