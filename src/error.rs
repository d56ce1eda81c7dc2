//! Error types for inkstore
//!
//! Provides a unified error type for all fallible operations. The memtable
//! itself reports malformed keys and arena exhaustion through `bool`/`Option`
//! returns; everything touching I/O or persisted bytes goes through here.

use thiserror::Error;

/// Result type alias using InkError
pub type Result<T> = std::result::Result<T, InkError>;

/// Unified error type for inkstore operations
#[derive(Debug, Error)]
pub enum InkError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Table Format Errors
    // -------------------------------------------------------------------------
    #[error("Table corruption detected: {0}")]
    Corruption(String),

    #[error("Unsupported table format version: {0}")]
    UnsupportedVersion(u32),

    #[error("Table size limit of {limit} bytes exceeded")]
    TableFull { limit: u64 },

    #[error("Keys must be added in strictly increasing order")]
    OutOfOrder,

    #[error("Invalid writer state: {0}")]
    InvalidState(String),

    // -------------------------------------------------------------------------
    // Key / Memtable Errors
    // -------------------------------------------------------------------------
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Memtable arena capacity exhausted")]
    CapacityExhausted,

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
