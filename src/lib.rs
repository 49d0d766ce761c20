//! # kvlite
//!
//! A durable in-memory key-value store with:
//! - Write-Ahead Logging (WAL) with CRC32 integrity checks
//! - Point-in-time snapshots and background compaction
//! - Per-key TTL with lazy and active expiration
//! - A line-oriented TCP protocol
//! - A pooled client
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                             │
//! │              (one worker per connection)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Engine                                │
//! │        (log-then-apply, recovery, compaction)               │
//! └──────┬──────────────┬──────────────┬──────────────┬─────────┘
//!        │              │              │              │
//!        ▼              ▼              ▼              ▼
//! ┌────────────┐ ┌────────────┐ ┌────────────┐ ┌────────────┐
//! │  Keyspace  │ │    WAL     │ │  Snapshot  │ │    TTL     │
//! │  (RwLock)  │ │  (Append)  │ │  (Atomic)  │ │  (Sweeper) │
//! └────────────┘ └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! Writes append to the WAL (flushed, optionally fsynced) before the
//! keyspace changes; recovery loads the last snapshot and replays the
//! WAL on top of it.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod client;
pub mod engine;
pub mod network;
pub mod protocol;
pub mod snapshot;
pub mod store;
pub mod ttl;
pub mod wal;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::Config;
pub use engine::Engine;
pub use error::{KvError, Result};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of kvlite
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
