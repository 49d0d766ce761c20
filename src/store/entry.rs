//! Keyspace entry definition

use std::time::{Duration, Instant};

/// A stored value with optional expiration
#[derive(Debug, Clone)]
pub struct Entry {
    /// The stored value
    pub value: String,

    /// When this entry expires (None = persistent)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Create a persistent entry
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    /// Create an entry that expires after `ttl`
    pub fn with_ttl(value: impl Into<String>, ttl: Duration) -> Self {
        Self {
            value: value.into(),
            expires_at: Some(Instant::now() + ttl),
        }
    }

    /// Whether the entry has expired
    #[inline]
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Instant::now() >= at,
            None => false,
        }
    }

    /// Remaining time to live, if any
    ///
    /// Returns None for persistent entries; returns a zero duration for
    /// entries that have already expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Replace the expiration with now + `ttl`
    pub fn set_expiration(&mut self, ttl: Duration) {
        self.expires_at = Some(Instant::now() + ttl);
    }

    /// Remove the expiration (make the entry persistent)
    pub fn remove_expiration(&mut self) {
        self.expires_at = None;
    }
}
