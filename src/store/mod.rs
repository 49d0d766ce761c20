//! Keyspace Module
//!
//! The authoritative in-memory state: a map from key to value with
//! optional per-key expiration.
//!
//! ## Responsibilities
//! - Insert, replace, and delete entries
//! - Lazy expiration on access, bulk expiration for the sweeper
//! - Glob-pattern key listing and paginated scans
//! - Consistent iteration for snapshot export
//!
//! ## Concurrency Model
//! A single RwLock around the map: readers (`get`, `keys`, `scan`,
//! `ttl`, `len`, `range`) run in parallel and are excluded only by
//! writers. `get` takes the read lock on the hit path and upgrades to
//! the write lock only to reap an expired entry.

mod entry;
mod glob;
mod keyspace;

pub use entry::Entry;
pub use glob::glob_match;
pub use keyspace::{Keyspace, ScanPage};
