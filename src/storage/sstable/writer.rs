//! Table Writer
//!
//! Streams a sorted run of versioned entries into the table format.
//!
//! Call order: `write_header` → `add`* (blocks are sealed automatically,
//! or explicitly with `write_data_block`) → `write_index` → `write_footer`.
//! `finish` runs whatever steps remain.

use std::cmp::Ordering;
use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{InkError, Result};
use crate::key::{self, VERSION_LEN};

use super::bloom::BloomFilter;
use super::format::{encode_index, encode_record, Footer, Header, IndexEntry};
use super::{
    checksum, TableMeta, TableOptions, BLOCK_FLAG_BLOOM, BLOCK_HEADER_SIZE, CHECKSUM_SIZE,
    FOOTER_FIXED_SIZE, INDEX_ENTRY_OVERHEAD, RECORD_OVERHEAD,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    New,
    Data,
    IndexWritten,
    Done,
    Failed,
}

/// Writer for a single table file
///
/// Not synchronized; one writer owns one sink.
pub struct TableWriter<W: Write> {
    sink: W,
    options: TableOptions,
    seed: u64,
    stage: Stage,

    /// Section currently being emitted
    staging: BytesMut,
    /// Bytes written to the sink so far
    offset: u64,

    // Pending data block
    records: BytesMut,
    block_first: Option<(Bytes, u64)>,
    block_hashes: Vec<u64>,
    block_count: u64,

    // Index block
    index: Vec<IndexEntry>,
    index_size: u64,
    index_offset: u64,

    // Table-wide bounds
    last: Option<(Bytes, u64)>,
    min_key: Option<Bytes>,
    min_version: u64,
    max_version: u64,
    entry_count: u64,
}

impl<W: Write> TableWriter<W> {
    /// Create a writer with a hash seed drawn from the OS RNG
    pub fn new(sink: W, options: TableOptions) -> Self {
        Self::with_seed(sink, options, OsRng.next_u64())
    }

    /// Create a writer with a caller-chosen hash seed
    pub fn with_seed(sink: W, options: TableOptions, seed: u64) -> Self {
        Self {
            sink,
            options,
            seed,
            stage: Stage::New,
            staging: BytesMut::with_capacity(options.block_size + 1024),
            offset: 0,
            records: BytesMut::with_capacity(options.block_size + 1024),
            block_first: None,
            block_hashes: Vec::new(),
            block_count: 0,
            index: Vec::new(),
            index_size: 4,
            index_offset: 0,
            last: None,
            min_key: None,
            min_version: u64::MAX,
            max_version: 0,
            entry_count: 0,
        }
    }

    /// Write the file header. Must be the first call.
    pub fn write_header(&mut self) -> Result<()> {
        self.expect_stage(Stage::New, "header already written")?;

        self.staging.clear();
        Header {
            flags: 0,
            hash_seed: self.seed,
        }
        .encode(&mut self.staging);
        self.emit()?;

        self.stage = Stage::Data;
        Ok(())
    }

    /// Add an entry under a versioned key (`raw || version`).
    ///
    /// `value = None` writes a tombstone. Keys must be strictly increasing in
    /// versioned-key order.
    pub fn add(&mut self, key: &[u8], value: Option<&[u8]>) -> Result<()> {
        self.expect_stage(Stage::Data, "add requires a written header and no index")?;

        if key.len() < VERSION_LEN {
            return Err(InkError::InvalidKey(format!(
                "versioned key must be at least {} bytes, got {}",
                VERSION_LEN,
                key.len()
            )));
        }
        let raw = key::raw_key(key);
        let version = key::version(key);

        if let Some((last_raw, last_version)) = &self.last {
            if key::compare_parts(last_raw, *last_version, raw, version) != Ordering::Less {
                return Err(InkError::OutOfOrder);
            }
        }

        let value_len = value.map_or(0, <[u8]>::len);
        let projected = self.projected_size(raw, value_len);
        if projected > self.options.max_table_size {
            return Err(InkError::TableFull {
                limit: self.options.max_table_size,
            });
        }

        let raw = Bytes::copy_from_slice(raw);
        encode_record(&mut self.records, &raw, version, value);
        if self.options.bloom_bits_per_key > 0 {
            self.block_hashes.push(BloomFilter::hash(&raw, self.seed));
        }
        if self.block_first.is_none() {
            self.block_first = Some((raw.clone(), version));
        }

        if self.min_key.is_none() {
            self.min_key = Some(raw.clone());
        }
        self.min_version = self.min_version.min(version);
        self.max_version = self.max_version.max(version);
        self.entry_count += 1;
        self.last = Some((raw, version));

        if self.records.len() >= self.options.block_size {
            self.write_data_block()?;
        }

        Ok(())
    }

    /// Seal the pending data block. A no-op when no records are pending.
    pub fn write_data_block(&mut self) -> Result<()> {
        self.expect_stage(Stage::Data, "data blocks follow the header")?;

        let Some((first_key, first_version)) = self.block_first.take() else {
            return Ok(());
        };

        self.staging.clear();
        if self.options.bloom_bits_per_key > 0 {
            let bloom = BloomFilter::build(&self.block_hashes, self.options.bloom_bits_per_key);
            self.staging.put_u32_le(BLOCK_FLAG_BLOOM);
            self.staging.put_u32_le(bloom.encoded_len() as u32);
            bloom.encode(&mut self.staging);
        } else {
            self.staging.put_u32_le(0);
            self.staging.put_u32_le(0);
        }
        self.staging.put_slice(&self.records);
        let sum = checksum(&self.staging, self.seed);
        self.staging.put_u64_le(sum);

        let block_offset = self.offset;
        let block_len = self.staging.len();
        self.emit()?;

        tracing::trace!(block_offset, block_len, "sealed data block");

        self.index_size += (INDEX_ENTRY_OVERHEAD + first_key.len()) as u64;
        self.index.push(IndexEntry {
            key: first_key,
            version: first_version,
            block_offset,
        });
        self.block_count += 1;
        self.records.clear();
        self.block_hashes.clear();

        Ok(())
    }

    /// Seal any pending block and write the index block
    pub fn write_index(&mut self) -> Result<()> {
        self.write_data_block()?;

        self.staging.clear();
        encode_index(&self.index, &mut self.staging);
        debug_assert_eq!(self.staging.len() as u64, self.index_size);

        self.index_offset = self.offset;
        self.emit()?;

        self.stage = Stage::IndexWritten;
        Ok(())
    }

    /// Write the footer and flush the sink. The file is complete afterwards.
    pub fn write_footer(&mut self) -> Result<()> {
        self.expect_stage(Stage::IndexWritten, "footer requires a written index")?;

        let footer = Footer {
            index_offset: self.index_offset,
            index_size: self.index_size as u32,
            min_version: self.min_version().unwrap_or(0),
            max_version: self.max_version().unwrap_or(0),
            min_key: self.min_key.clone().unwrap_or_default(),
            max_key: self.max_key(),
            footer_offset: self.offset,
        };

        self.staging.clear();
        footer.encode(&mut self.staging, self.seed);
        self.emit()?;
        self.sink.flush()?;

        self.stage = Stage::Done;

        tracing::debug!(
            entries = self.entry_count,
            blocks = self.block_count,
            file_size = self.offset,
            "table written"
        );

        Ok(())
    }

    /// Run every remaining step and return the table metadata
    pub fn finish(&mut self) -> Result<TableMeta> {
        if self.stage == Stage::New {
            self.write_header()?;
        }
        if self.stage == Stage::Data {
            self.write_index()?;
        }
        if self.stage == Stage::IndexWritten {
            self.write_footer()?;
        }
        self.expect_stage(Stage::Done, "writer failed")?;

        Ok(self.meta())
    }

    /// Metadata for everything added so far
    pub fn meta(&self) -> TableMeta {
        TableMeta {
            entry_count: self.entry_count,
            block_count: self.block_count,
            min_key: self.min_key.as_deref().unwrap_or_default().to_vec(),
            max_key: self.max_key().to_vec(),
            min_version: self.min_version().unwrap_or(0),
            max_version: self.max_version().unwrap_or(0),
            file_size: self.offset,
            hash_seed: self.seed,
        }
    }

    /// Checksum seed persisted in the header
    pub fn hash_seed(&self) -> u64 {
        self.seed
    }

    /// Bytes written to the sink so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Recover the sink (e.g. to `sync_all` a file)
    pub fn into_inner(self) -> W {
        self.sink
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn expect_stage(&self, stage: Stage, msg: &str) -> Result<()> {
        if self.stage != stage {
            return Err(InkError::InvalidState(format!("{} (stage: {:?})", msg, self.stage)));
        }
        Ok(())
    }

    /// Write the staging buffer to the sink
    fn emit(&mut self) -> Result<()> {
        if let Err(e) = self.sink.write_all(&self.staging) {
            self.stage = Stage::Failed;
            return Err(e.into());
        }
        self.offset += self.staging.len() as u64;
        Ok(())
    }

    /// File size if the next record were added and the table then finished
    fn projected_size(&self, raw: &[u8], value_len: usize) -> u64 {
        let record = (RECORD_OVERHEAD + raw.len() + value_len) as u64;
        let pending = (self.records.len() as u64) + record;

        let bloom = BloomFilter::encoded_len_for(
            self.block_hashes.len() + 1,
            self.options.bloom_bits_per_key,
        ) as u64;

        let index = if self.block_first.is_none() {
            self.index_size + (INDEX_ENTRY_OVERHEAD + raw.len()) as u64
        } else {
            self.index_size
        };

        let min_key_len = self.min_key.as_ref().map_or(raw.len(), Bytes::len);
        let footer = (FOOTER_FIXED_SIZE + min_key_len + raw.len()) as u64;

        self.offset
            + (BLOCK_HEADER_SIZE + CHECKSUM_SIZE) as u64
            + bloom
            + pending
            + index
            + footer
    }

    fn max_key(&self) -> Bytes {
        self.last.as_ref().map(|(raw, _)| raw.clone()).unwrap_or_default()
    }

    fn min_version(&self) -> Option<u64> {
        (self.entry_count > 0).then_some(self.min_version)
    }

    fn max_version(&self) -> Option<u64> {
        (self.entry_count > 0).then_some(self.max_version)
    }
}
