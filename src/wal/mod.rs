//! Write-Ahead Log (WAL) Module
//!
//! Provides durability guarantees through append-only logging.
//!
//! ## Responsibilities
//! - Append a record for every mutating operation before it is applied
//! - CRC32 checksums for corruption detection
//! - Replay in file order during recovery
//! - Truncation after a successful snapshot
//!
//! ## File Format
//! One record per line, pipe-separated, checksum last:
//! ```text
//! <timestamp_nanos>|<SET|DELETE|CLEAR>|<key>|<value>|<crc32>\n
//! ```
//! Key and value are escaped (`\` -> `\\`, `|` -> `\|`, newline ->
//! `\n`); the checksum covers the unescaped fields.

mod reader;
mod record;
mod writer;

pub use reader::{read_all, replay};
pub use record::{DecodeError, Op, Record};
pub use writer::{Wal, WAL_FILE};
