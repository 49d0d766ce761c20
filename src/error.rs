//! Error types for kvlite
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for kvlite operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL write failed: {0}")]
    WalWrite(String),

    #[error("WAL corruption at line {line}: {reason}")]
    WalCorrupt { line: usize, reason: String },

    // -------------------------------------------------------------------------
    // Snapshot / Recovery Errors
    // -------------------------------------------------------------------------
    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("recovery failed: {0}")]
    Recovery(String),

    // -------------------------------------------------------------------------
    // Keyspace Errors
    // -------------------------------------------------------------------------
    #[error("key not found")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Engine Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("engine is closed")]
    Closed,

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("network error: {0}")]
    Network(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Client Pool Errors
    // -------------------------------------------------------------------------
    #[error("connection pool exhausted")]
    PoolExhausted,

    #[error("connection pool is closed")]
    PoolClosed,
}
