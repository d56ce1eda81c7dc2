//! # inkstore
//!
//! An embedded, multi-version key-value storage engine with:
//! - An arena-backed skip list memtable with MVCC key ordering
//! - Self-describing, checksummed on-disk tables
//! - Snapshot reads ("newest value as of version V") across both
//!
//! ## Architecture Overview
//!
//! ```text
//!            put(raw, version, value) / get(raw, version)
//!                              │
//! ┌────────────────────────────▼────────────────────────────────┐
//! │                          Engine                              │
//! │                 (single writer, Mutex-owned)                 │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │                              │
//!                ▼                              ▼
//!   ┌──────────────────────┐  flush   ┌──────────────────────┐
//!   │  MemTable            │ ───────► │  StorageManager      │
//!   │  skip list over an   │          │  TableWriter /       │
//!   │  8 MiB byte arena    │          │  TableReader (.sst)  │
//!   └──────────────────────┘          └──────────────────────┘
//! ```
//!
//! Keys are versioned: `raw || version` where the version is a big-endian
//! `u64` suffix. See [`key`] for the ordering rules.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod key;
pub mod memtable;
pub mod storage;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{InkError, Result};
pub use config::Config;
pub use engine::Engine;
pub use memtable::MemTable;
pub use storage::{TableReader, TableWriter};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of inkstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
