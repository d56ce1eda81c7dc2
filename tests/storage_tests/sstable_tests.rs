//! Tests for the table format
//!
//! These tests verify:
//! - Byte layout of the header
//! - Writer call order, key ordering and size limits
//! - MVCC point lookups and tombstones through the reader
//! - Multi-block tables with and without bloom filters
//! - Rejection of corrupted files

use std::fs;
use std::path::PathBuf;

use bytes::Bytes;
use inkstore::key::key_at;
use inkstore::storage::sstable::{
    checksum, TableOptions, FOOTER_MAGIC, FORMAT_VERSION, HEADER_SIZE, MAGIC,
};
use inkstore::storage::{TableReader, TableWriter};
use inkstore::InkError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_table() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("test.sst");
    (temp_dir, path)
}

fn small_blocks() -> TableOptions {
    TableOptions {
        block_size: 128,
        ..TableOptions::default()
    }
}

/// Build an in-memory table with numbered entries at version 1
fn build_table(count: usize, options: TableOptions) -> Vec<u8> {
    let mut writer = TableWriter::with_seed(Vec::new(), options, 0x5eed);
    writer.write_header().unwrap();
    for i in 0..count {
        let key = key_at(format!("key{:05}", i).as_bytes(), 1); // zero-padded for order
        writer.add(&key, Some(format!("value{}", i).as_bytes())).unwrap();
    }
    writer.finish().unwrap();
    writer.into_inner()
}

fn open(image: Vec<u8>) -> TableReader {
    TableReader::from_bytes(Bytes::from(image)).unwrap()
}

// =============================================================================
// Header Tests
// =============================================================================

#[test]
fn test_header_layout() {
    let mut writer = TableWriter::with_seed(Vec::new(), TableOptions::default(), 42);
    writer.write_header().unwrap();
    let out = writer.get_ref();

    assert_eq!(out.len(), HEADER_SIZE);
    assert_eq!(&out[0..8], &MAGIC.to_le_bytes());
    assert_eq!(&out[8..12], &FORMAT_VERSION.to_le_bytes());
    assert_eq!(&out[12..16], &0u32.to_le_bytes());
    assert_eq!(&out[16..24], &42u64.to_le_bytes());
    assert_eq!(&out[24..32], &checksum(&out[..24], 42).to_le_bytes());
}

#[test]
fn test_header_written_once() {
    let mut writer = TableWriter::with_seed(Vec::new(), TableOptions::default(), 1);
    writer.write_header().unwrap();
    assert!(matches!(writer.write_header(), Err(InkError::InvalidState(_))));
    assert_eq!(writer.get_ref().len(), HEADER_SIZE);
}

#[test]
fn test_seed_is_random_per_writer() {
    let a = TableWriter::new(Vec::new(), TableOptions::default());
    let b = TableWriter::new(Vec::new(), TableOptions::default());
    assert_ne!(a.hash_seed(), b.hash_seed());
}

// =============================================================================
// Writer Contract Tests
// =============================================================================

#[test]
fn test_add_before_header_rejected() {
    let mut writer = TableWriter::with_seed(Vec::new(), TableOptions::default(), 1);
    let result = writer.add(&key_at(b"a", 1), Some(b"v"));
    assert!(matches!(result, Err(InkError::InvalidState(_))));
}

#[test]
fn test_add_out_of_order_rejected() {
    let mut writer = TableWriter::with_seed(Vec::new(), TableOptions::default(), 1);
    writer.write_header().unwrap();
    writer.add(&key_at(b"b", 1), Some(b"v")).unwrap();

    assert!(matches!(writer.add(&key_at(b"a", 1), Some(b"v")), Err(InkError::OutOfOrder)));
    // same key twice
    assert!(matches!(writer.add(&key_at(b"b", 1), Some(b"v")), Err(InkError::OutOfOrder)));
    // older version of the same key is fine: it sorts after
    writer.add(&key_at(b"b", 0), Some(b"v")).unwrap();
    assert_eq!(writer.entry_count(), 2);
}

#[test]
fn test_add_short_key_rejected() {
    let mut writer = TableWriter::with_seed(Vec::new(), TableOptions::default(), 1);
    writer.write_header().unwrap();
    assert!(matches!(writer.add(b"short", Some(b"v")), Err(InkError::InvalidKey(_))));
}

#[test]
fn test_footer_requires_index() {
    let mut writer = TableWriter::with_seed(Vec::new(), TableOptions::default(), 1);
    writer.write_header().unwrap();
    assert!(matches!(writer.write_footer(), Err(InkError::InvalidState(_))));

    writer.write_index().unwrap();
    assert!(matches!(writer.add(&key_at(b"a", 1), None), Err(InkError::InvalidState(_))));
    writer.write_footer().unwrap();
}

#[test]
fn test_table_full() {
    let options = TableOptions {
        max_table_size: 4 * 1024,
        ..TableOptions::default()
    };
    let mut writer = TableWriter::with_seed(Vec::new(), options, 1);
    writer.write_header().unwrap();

    let value = vec![1u8; 100];
    let mut added = 0;
    let err = loop {
        let key = key_at(format!("key{:05}", added).as_bytes(), 1);
        match writer.add(&key, Some(&value)) {
            Ok(()) => added += 1,
            Err(e) => break e,
        }
    };
    assert!(matches!(err, InkError::TableFull { limit: 4096 }));
    assert!(added > 10);

    let meta = writer.finish().unwrap();
    assert_eq!(meta.entry_count, added);
    assert!(meta.file_size <= 4 * 1024);

    let reader = open(writer.into_inner());
    assert_eq!(reader.entry_count(), added);
}

#[test]
fn test_single_record_table_size_matches_writer() {
    for bloom_bits_per_key in [0, 10] {
        let options = TableOptions {
            bloom_bits_per_key,
            ..TableOptions::default()
        };
        let mut writer = TableWriter::with_seed(Vec::new(), options, 1);
        writer.write_header().unwrap();
        writer.add(&key_at(b"lonely", 4), Some(&[7u8; 300])).unwrap();
        let meta = writer.finish().unwrap();

        assert_eq!(meta.file_size, options.single_record_table_size(6, 300));
    }
}

// =============================================================================
// Metadata Tests
// =============================================================================

#[test]
fn test_empty_table() {
    let image = build_table(0, TableOptions::default());
    let reader = open(image);

    assert_eq!(reader.entry_count(), 0);
    assert_eq!(reader.block_count(), 0);
    assert_eq!(reader.get(&key_at(b"anything", 1)).unwrap(), None);
    assert_eq!(reader.iter().count(), 0);
    assert!(!reader.might_contain(b"anything"));
}

#[test]
fn test_meta_tracks_bounds() {
    let mut writer = TableWriter::with_seed(Vec::new(), TableOptions::default(), 9);
    writer.write_header().unwrap();
    writer.add(&key_at(b"apple", 3), Some(b"1")).unwrap();
    writer.add(&key_at(b"banana", 8), Some(b"2")).unwrap();
    writer.add(&key_at(b"cherry", 5), None).unwrap();
    let meta = writer.finish().unwrap();

    assert_eq!(meta.entry_count, 3);
    assert_eq!(meta.min_key, b"apple");
    assert_eq!(meta.max_key, b"cherry");
    assert_eq!(meta.min_version, 3);
    assert_eq!(meta.max_version, 8);
    assert_eq!(meta.hash_seed, 9);

    let image = writer.into_inner();
    assert_eq!(meta.file_size, image.len() as u64);
    assert_eq!(&image[image.len() - 8..], &FOOTER_MAGIC.to_le_bytes());

    let reader = open(image);
    assert_eq!(reader.meta(), &meta);
}

// =============================================================================
// Reader Lookup Tests
// =============================================================================

#[test]
fn test_reader_get_existing_keys() {
    let reader = open(build_table(100, TableOptions::default()));

    for i in 0..100 {
        let key = key_at(format!("key{:05}", i).as_bytes(), 1);
        let value = reader.lookup(&key).unwrap();
        assert_eq!(value.as_deref(), Some(format!("value{}", i).as_bytes()));
    }
}

#[test]
fn test_reader_get_missing_keys() {
    let reader = open(build_table(100, small_blocks()));

    assert_eq!(reader.get(&key_at(b"aaa", 1)).unwrap(), None);
    assert_eq!(reader.get(&key_at(b"key00050x", 1)).unwrap(), None);
    assert_eq!(reader.get(&key_at(b"zzz", 1)).unwrap(), None);
    // version 0 predates everything
    assert_eq!(reader.get(&key_at(b"key00050", 0)).unwrap(), None);
}

#[test]
fn test_reader_snapshot_reads() {
    let mut writer = TableWriter::with_seed(Vec::new(), small_blocks(), 3);
    writer.write_header().unwrap();
    writer.add(&key_at(b"a", 3), None).unwrap();
    writer.add(&key_at(b"a", 2), Some(b"v2")).unwrap();
    writer.add(&key_at(b"a", 1), Some(b"v1")).unwrap();
    writer.add(&key_at(b"b", 1), Some(b"b1")).unwrap();
    writer.finish().unwrap();
    let reader = open(writer.into_inner());

    assert_eq!(reader.lookup(&key_at(b"a", 1)).unwrap().as_deref(), Some(&b"v1"[..]));
    assert_eq!(reader.lookup(&key_at(b"a", 2)).unwrap().as_deref(), Some(&b"v2"[..]));
    // tombstone at 3 hides the key from 3 onwards
    let tombstone = reader.get(&key_at(b"a", 9)).unwrap().unwrap();
    assert!(tombstone.is_tombstone());
    assert_eq!(tombstone.version, 3);
    assert_eq!(reader.lookup(&key_at(b"a", 9)).unwrap(), None);
    assert_eq!(reader.lookup(&key_at(b"b", 7)).unwrap().as_deref(), Some(&b"b1"[..]));
}

#[test]
fn test_versions_spanning_blocks() {
    // Tiny blocks force every version into its own block.
    let options = TableOptions {
        block_size: 1,
        ..TableOptions::default()
    };
    let mut writer = TableWriter::with_seed(Vec::new(), options, 77);
    writer.write_header().unwrap();
    for version in (1..=10u64).rev() {
        writer.add(&key_at(b"k", version * 10), Some(format!("v{}", version * 10).as_bytes())).unwrap();
    }
    writer.add(&key_at(b"m", 1), Some(b"m1")).unwrap();
    let meta = writer.finish().unwrap();
    assert_eq!(meta.block_count, 11);

    let reader = open(writer.into_inner());
    for version in 1..=10u64 {
        let value = reader.lookup(&key_at(b"k", version * 10 + 5)).unwrap();
        assert_eq!(value.as_deref(), Some(format!("v{}", version * 10).as_bytes()));
    }
    assert_eq!(reader.lookup(&key_at(b"k", 5)).unwrap(), None);
    assert_eq!(reader.lookup(&key_at(b"l", 5)).unwrap(), None);
}

#[test]
fn test_multi_block_without_bloom() {
    let options = TableOptions {
        block_size: 256,
        bloom_bits_per_key: 0,
        ..TableOptions::default()
    };
    let reader = open(build_table(500, options));
    assert!(reader.block_count() > 10);

    for i in (0..500).step_by(7) {
        let key = key_at(format!("key{:05}", i).as_bytes(), 1);
        assert_eq!(reader.lookup(&key).unwrap().as_deref(), Some(format!("value{}", i).as_bytes()));
    }
    assert_eq!(reader.lookup(&key_at(b"key00250a", 1)).unwrap(), None);
}

// =============================================================================
// Iterator Tests
// =============================================================================

#[test]
fn test_iter_returns_all_entries_in_order() {
    let reader = open(build_table(300, small_blocks()));

    let entries: Vec<_> = reader.iter().collect::<Result<_, _>>().unwrap();
    assert_eq!(entries.len(), 300);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.key.as_ref(), format!("key{:05}", i).as_bytes());
        assert_eq!(entry.version, 1);
        assert_eq!(entry.versioned_key(), key_at(format!("key{:05}", i).as_bytes(), 1));
    }
}

// =============================================================================
// File / Corruption Tests
// =============================================================================

#[test]
fn test_open_from_file() {
    let (_temp, path) = setup_temp_table();
    fs::write(&path, build_table(20, TableOptions::default())).unwrap();

    let reader = TableReader::open(&path).unwrap();
    assert_eq!(reader.entry_count(), 20);
    assert_eq!(reader.hash_seed(), 0x5eed);
    assert_eq!(reader.flags(), 0);
}

#[test]
fn test_open_nonexistent_file() {
    let (_temp, path) = setup_temp_table();
    assert!(matches!(TableReader::open(&path), Err(InkError::Io(_))));
}

#[test]
fn test_corrupt_data_block_rejected() {
    let mut image = build_table(50, small_blocks());
    image[HEADER_SIZE + 20] ^= 0xff;

    let result = TableReader::from_bytes(Bytes::from(image));
    assert!(matches!(result, Err(InkError::Corruption(_))));
}

#[test]
fn test_corrupt_header_rejected() {
    let mut image = build_table(5, TableOptions::default());
    image[20] ^= 0x01; // inside the hash seed

    assert!(matches!(
        TableReader::from_bytes(Bytes::from(image)),
        Err(InkError::Corruption(_))
    ));
}

#[test]
fn test_bad_magic_rejected() {
    let mut image = build_table(5, TableOptions::default());
    image[0] ^= 0x01;
    assert!(matches!(
        TableReader::from_bytes(Bytes::from(image)),
        Err(InkError::Corruption(_))
    ));
}

#[test]
fn test_unsupported_version_rejected() {
    let mut image = build_table(5, TableOptions::default());
    image[8..12].copy_from_slice(&11u32.to_le_bytes());
    // keep the header checksum consistent so only the version is wrong
    let sum = checksum(&image[..24], 0x5eed);
    image[24..32].copy_from_slice(&sum.to_le_bytes());

    assert!(matches!(
        TableReader::from_bytes(Bytes::from(image)),
        Err(InkError::UnsupportedVersion(11))
    ));
}

#[test]
fn test_corrupt_footer_rejected() {
    let mut image = build_table(5, TableOptions::default());
    let len = image.len();

    let mut bad_magic = image.clone();
    bad_magic[len - 1] ^= 0xff;
    assert!(matches!(
        TableReader::from_bytes(Bytes::from(bad_magic)),
        Err(InkError::Corruption(_))
    ));

    // a byte inside the footer's max key
    image[len - 30] ^= 0xff;
    assert!(matches!(
        TableReader::from_bytes(Bytes::from(image)),
        Err(InkError::Corruption(_))
    ));
}

#[test]
fn test_truncated_file_rejected() {
    let image = build_table(50, TableOptions::default());
    for len in [0, 10, HEADER_SIZE, HEADER_SIZE + 24, image.len() - 1] {
        let result = TableReader::from_bytes(Bytes::copy_from_slice(&image[..len]));
        assert!(result.is_err(), "truncation to {} bytes accepted", len);
    }
}

#[test]
fn test_footer_offset_overflow_rejected() {
    let mut image = build_table(10, TableOptions::default());
    let len = image.len();
    image[len - 24..len - 16].copy_from_slice(&u64::MAX.to_le_bytes());

    assert!(matches!(
        TableReader::from_bytes(Bytes::from(image)),
        Err(InkError::Corruption(_))
    ));
}

#[test]
fn test_corrupt_index_key_rejected() {
    let options = TableOptions {
        block_size: 64,
        bloom_bits_per_key: 0,
        ..TableOptions::default()
    };
    let mut image = build_table(50, options);
    let len = image.len();

    let footer_offset = u64::from_le_bytes(image[len - 24..len - 16].try_into().unwrap()) as usize;
    let index_offset =
        u64::from_le_bytes(image[footer_offset..footer_offset + 8].try_into().unwrap()) as usize;

    // count (4) | entry 0: len (4) + "key00000" (8) + version (8) + offset (8) | entry 1: len (4)
    let entry1_key = index_offset + 4 + 28 + 4;
    assert_eq!(&image[entry1_key..entry1_key + 3], b"key");
    image[entry1_key + 3] = b'z';

    assert!(matches!(
        TableReader::from_bytes(Bytes::from(image)),
        Err(InkError::Corruption(_))
    ));
}
