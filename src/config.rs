//! Configuration for kvlite
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{KvError, Result};

/// Main configuration for a kvlite instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Host to bind to
    pub host: String,

    /// Port to listen on (0 = OS-assigned)
    pub port: u16,

    /// Max concurrent client connections (0 = unlimited)
    pub max_connections: usize,

    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory for WAL and snapshot files
    pub data_dir: PathBuf,

    /// fsync the WAL after every append (slower but safer)
    pub sync_mode: bool,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Trigger compaction after this many WAL entries
    pub max_wal_entries: u64,

    /// Trigger compaction after the WAL reaches this size (bytes)
    pub max_wal_size: u64,

    /// How often the background checker looks for compaction work
    pub compaction_interval: Duration,

    // -------------------------------------------------------------------------
    // TTL Configuration
    // -------------------------------------------------------------------------
    /// How often the background sweeper reaps expired keys
    pub ttl_check_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6380,
            max_connections: 0,
            data_dir: PathBuf::from("./data"),
            sync_mode: false,
            max_wal_entries: 10_000,
            max_wal_size: 10 * 1024 * 1024, // 10 MiB
            compaction_interval: Duration::from_secs(60),
            ttl_check_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load configuration from environment variables, starting from defaults
    ///
    /// Recognized: KVLITE_HOST, KVLITE_PORT, KVLITE_MAX_CONNECTIONS
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("KVLITE_HOST") {
            if !host.is_empty() {
                config.host = host;
            }
        }

        if let Ok(port) = std::env::var("KVLITE_PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }

        if let Ok(max_conn) = std::env::var("KVLITE_MAX_CONNECTIONS") {
            if let Ok(m) = max_conn.parse() {
                config.max_connections = m;
            }
        }

        config
    }

    /// Full bind address (host:port)
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(KvError::Config("host must not be empty".to_string()));
        }
        if self.max_wal_entries == 0 {
            return Err(KvError::Config(
                "max_wal_entries must be greater than zero".to_string(),
            ));
        }
        if self.max_wal_size == 0 {
            return Err(KvError::Config(
                "max_wal_size must be greater than zero".to_string(),
            ));
        }
        if self.compaction_interval.is_zero() {
            return Err(KvError::Config(
                "compaction_interval must be greater than zero".to_string(),
            ));
        }
        if self.ttl_check_interval.is_zero() {
            return Err(KvError::Config(
                "ttl_check_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn sync_mode(mut self, sync: bool) -> Self {
        self.config.sync_mode = sync;
        self
    }

    pub fn max_wal_entries(mut self, entries: u64) -> Self {
        self.config.max_wal_entries = entries;
        self
    }

    pub fn max_wal_size(mut self, bytes: u64) -> Self {
        self.config.max_wal_size = bytes;
        self
    }

    pub fn compaction_interval(mut self, interval: Duration) -> Self {
        self.config.compaction_interval = interval;
        self
    }

    pub fn ttl_check_interval(mut self, interval: Duration) -> Self {
        self.config.ttl_check_interval = interval;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
