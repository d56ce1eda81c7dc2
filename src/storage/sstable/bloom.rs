//! Per-block bloom filter over raw keys.
//!
//! Blob layout: `NumHashes u32 | BitArray`. Probe positions come from a
//! single seeded WyHash value using double hashing.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{InkError, Result};

use super::checksum;

const MIN_BITS: usize = 64;
const MAX_HASHES: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Bytes,
    num_hashes: u32,
}

impl BloomFilter {
    /// Hash a raw key the way the filter expects
    pub fn hash(raw: &[u8], seed: u64) -> u64 {
        checksum(raw, seed)
    }

    /// Encoded size of a filter built over `keys` keys; 0 when filters are off
    pub fn encoded_len_for(keys: usize, bits_per_key: usize) -> usize {
        if bits_per_key == 0 {
            return 0;
        }
        4 + bit_bytes(keys, bits_per_key)
    }

    /// Build a filter sized for `hashes.len()` keys
    pub fn build(hashes: &[u64], bits_per_key: usize) -> Self {
        let num_bytes = bit_bytes(hashes.len(), bits_per_key);
        let num_bits = num_bytes * 8;

        // k = bits_per_key * ln(2), rounded down
        let num_hashes = ((bits_per_key as u64 * 69 / 100) as u32).clamp(1, MAX_HASHES);

        let mut bits = vec![0u8; num_bytes];
        for &hash in hashes {
            for bit in probes(hash, num_hashes, num_bits) {
                bits[bit / 8] |= 1 << (bit % 8);
            }
        }

        Self {
            bits: Bytes::from(bits),
            num_hashes,
        }
    }

    pub fn may_contain_hash(&self, hash: u64) -> bool {
        let num_bits = self.bits.len() * 8;
        probes(hash, self.num_hashes, num_bits).all(|bit| self.bits[bit / 8] & (1 << (bit % 8)) != 0)
    }

    pub fn may_contain(&self, raw: &[u8], seed: u64) -> bool {
        self.may_contain_hash(Self::hash(raw, seed))
    }

    pub fn encoded_len(&self) -> usize {
        4 + self.bits.len()
    }

    pub fn encode(&self, out: &mut BytesMut) {
        out.put_u32_le(self.num_hashes);
        out.put_slice(&self.bits);
    }

    pub fn decode(blob: Bytes) -> Result<Self> {
        if blob.len() < 5 {
            return Err(InkError::Corruption("bloom filter too short".to_string()));
        }

        let mut count = [0u8; 4];
        count.copy_from_slice(&blob[..4]);
        let num_hashes = u32::from_le_bytes(count);
        if num_hashes == 0 || num_hashes > MAX_HASHES {
            return Err(InkError::Corruption(format!(
                "bloom filter hash count {} out of range",
                num_hashes
            )));
        }

        Ok(Self {
            bits: blob.slice(4..),
            num_hashes,
        })
    }
}

fn bit_bytes(keys: usize, bits_per_key: usize) -> usize {
    keys.saturating_mul(bits_per_key).max(MIN_BITS).div_ceil(8)
}

fn probes(hash: u64, num_hashes: u32, num_bits: usize) -> impl Iterator<Item = usize> {
    let delta = hash.rotate_right(33) | 1;
    (0..num_hashes as u64).map(move |i| {
        let h = hash.wrapping_add(i.wrapping_mul(delta));
        (h % num_bits as u64) as usize
    })
}
