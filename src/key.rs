//! Versioned key codec
//!
//! A versioned key is an opaque byte string of the form `raw || version`,
//! where `version` is a `u64` encoded big-endian in the trailing
//! [`VERSION_LEN`] bytes.
//!
//! ## Ordering
//! - Raw keys compare lexicographically.
//! - For equal raw keys, versions compare in *descending* order, so a forward
//!   scan meets the newest version of a key first.
//! - A key shorter than [`VERSION_LEN`] compares as less than any valid key.
//!
//! ```text
//! a@3 < a@2 < a@1 < b@9 < b@0
//! ```

use std::cmp::Ordering;

/// Length of the big-endian version suffix
pub const VERSION_LEN: usize = 8;

/// Compare two versioned keys (raw ascending, version descending)
pub fn compare_key(a: &[u8], b: &[u8]) -> Ordering {
    if a.len() < VERSION_LEN {
        return Ordering::Less;
    }
    if b.len() < VERSION_LEN {
        return Ordering::Greater;
    }

    compare_parts(raw_key(a), version(a), raw_key(b), version(b))
}

/// Compare a split `(raw, version)` pair with the same rules as [`compare_key`]
pub fn compare_parts(a_raw: &[u8], a_version: u64, b_raw: &[u8], b_version: u64) -> Ordering {
    a_raw
        .cmp(b_raw)
        .then_with(|| b_version.cmp(&a_version))
}

/// Version encoded in the trailing 8 bytes, or 0 for short input
pub fn version(key: &[u8]) -> u64 {
    if key.len() < VERSION_LEN {
        return 0;
    }

    let mut suffix = [0u8; VERSION_LEN];
    suffix.copy_from_slice(&key[key.len() - VERSION_LEN..]);
    u64::from_be_bytes(suffix)
}

/// Strip the version suffix. Short input is returned unchanged.
pub fn raw_key(key: &[u8]) -> &[u8] {
    if key.len() < VERSION_LEN {
        return key;
    }
    &key[..key.len() - VERSION_LEN]
}

/// Build the lookup key for `raw` at `version`
pub fn key_at(raw: &[u8], version: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(raw.len() + VERSION_LEN);
    key.extend_from_slice(raw);
    key.extend_from_slice(&version.to_be_bytes());
    key
}
