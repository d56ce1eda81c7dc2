//! Table Iterator
//!
//! Sequential iteration over all records of a table, block by block.

use crate::error::Result;

use super::format::{decode_record, Decoder};
use super::reader::Block;
use super::TableEntry;

/// Iterator over table records in versioned-key order (tombstones included)
pub struct TableIterator<'a> {
    blocks: &'a [Block],
    /// Index of the block being decoded
    block: usize,
    current: Option<Decoder>,
    /// Set after the first decode error; iteration stops there
    failed: bool,
}

impl<'a> TableIterator<'a> {
    pub(super) fn new(blocks: &'a [Block]) -> Self {
        Self {
            blocks,
            block: 0,
            current: None,
            failed: false,
        }
    }
}

impl<'a> Iterator for TableIterator<'a> {
    type Item = Result<TableEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        loop {
            if let Some(dec) = self.current.as_mut() {
                if !dec.is_empty() {
                    return Some(match decode_record(dec) {
                        Ok((key, version, value)) => Ok(TableEntry {
                            key,
                            version,
                            value,
                        }),
                        Err(e) => {
                            self.failed = true;
                            Err(e)
                        }
                    });
                }
                self.block += 1;
            }

            let block = self.blocks.get(self.block)?;
            self.current = Some(Decoder::new(block.records.clone(), "record"));
        }
    }
}
