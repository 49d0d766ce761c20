//! Snapshot Store
//!
//! Atomic point-in-time dumps of the keyspace, used to bound WAL
//! growth. A snapshot is a self-describing JSON document:
//!
//! ```text
//! { "version": 1, "timestamp": <nanos>, "key_count": N, "data": {...} }
//! ```
//!
//! Writes go to a uniquely named temp file in the same directory,
//! which is flushed and fsynced before being renamed over the
//! canonical path; the directory itself is fsynced afterwards so the
//! rename survives a crash. Readers therefore observe either the old
//! snapshot or the new one, never a partial file.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{KvError, Result};

/// Canonical snapshot file name inside the data directory
pub const SNAPSHOT_FILE: &str = "kvlite.snapshot";

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// A loaded snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format version
    pub version: u32,

    /// Unix timestamp in nanoseconds when the snapshot was taken
    pub timestamp: i64,

    /// Number of keys in `data`
    pub key_count: usize,

    /// The key-value pairs
    pub data: HashMap<String, String>,
}

/// Snapshot metadata without the data payload
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub version: u32,
    pub timestamp: i64,
    pub key_count: usize,
    pub size: u64,
    pub path: PathBuf,
}

/// Borrowed view serialized during writes, sparing a copy of the data
#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    timestamp: i64,
    key_count: usize,
    data: &'a HashMap<String, String>,
}

/// Metadata-only decode target for `info`
#[derive(Deserialize)]
struct SnapshotMeta {
    version: u32,
    timestamp: i64,
    key_count: usize,
}

/// Creates and reads snapshots inside a data directory
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Create a snapshot store rooted at `dir`, creating it if missing
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .map_err(|e| KvError::Snapshot(format!("create directory: {e}")))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Canonical snapshot path
    pub fn path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    /// Atomically write a snapshot of `data`
    pub fn write(&self, data: &HashMap<String, String>) -> Result<()> {
        let timestamp = unix_nanos();
        let snapshot = SnapshotRef {
            version: SNAPSHOT_VERSION,
            timestamp,
            key_count: data.len(),
            data,
        };

        let temp_path = self.dir.join(format!("{SNAPSHOT_FILE}.tmp.{timestamp}"));

        let result = self.write_temp(&temp_path, &snapshot);
        if let Err(e) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_path, self.path()) {
            let _ = fs::remove_file(&temp_path);
            return Err(KvError::Snapshot(format!("rename: {e}")));
        }

        // Make the rename itself durable.
        self.sync_dir()?;

        Ok(())
    }

    fn write_temp(&self, temp_path: &Path, snapshot: &SnapshotRef<'_>) -> Result<()> {
        let file = File::create(temp_path)
            .map_err(|e| KvError::Snapshot(format!("create temp file: {e}")))?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, snapshot)
            .map_err(|e| KvError::Snapshot(format!("encode: {e}")))?;

        writer
            .flush()
            .map_err(|e| KvError::Snapshot(format!("flush: {e}")))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| KvError::Snapshot(format!("fsync: {e}")))?;

        Ok(())
    }

    #[cfg(unix)]
    fn sync_dir(&self) -> Result<()> {
        File::open(&self.dir)
            .and_then(|d| d.sync_all())
            .map_err(|e| KvError::Snapshot(format!("fsync directory: {e}")))
    }

    #[cfg(not(unix))]
    fn sync_dir(&self) -> Result<()> {
        // Directory handles cannot be fsynced on this platform.
        Ok(())
    }

    /// Load the snapshot, if one exists
    pub fn load(&self) -> Result<Option<Snapshot>> {
        let file = match File::open(self.path()) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(KvError::Snapshot(format!("open: {e}"))),
        };

        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| KvError::Snapshot(format!("decode: {e}")))?;

        Ok(Some(snapshot))
    }

    /// Whether a snapshot file exists
    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Size of the snapshot file in bytes (0 when absent)
    pub fn size(&self) -> Result<u64> {
        match fs::metadata(self.path()) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(KvError::Snapshot(format!("stat: {e}"))),
        }
    }

    /// Snapshot metadata without keeping the data payload
    pub fn info(&self) -> Result<Option<SnapshotInfo>> {
        let path = self.path();
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(KvError::Snapshot(format!("open: {e}"))),
        };

        let meta: SnapshotMeta = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| KvError::Snapshot(format!("decode metadata: {e}")))?;

        let size = fs::metadata(&path)
            .map_err(|e| KvError::Snapshot(format!("stat: {e}")))?
            .len();

        Ok(Some(SnapshotInfo {
            version: meta.version,
            timestamp: meta.timestamp,
            key_count: meta.key_count,
            size,
            path,
        }))
    }

    /// Remove the snapshot file, if present
    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KvError::Snapshot(format!("delete: {e}"))),
        }
    }

    /// Check that the snapshot decodes, its version is recognized, and
    /// its key count matches the data
    pub fn verify(&self) -> Result<()> {
        let snapshot = self
            .load()?
            .ok_or_else(|| KvError::Snapshot("no snapshot found".to_string()))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(KvError::Snapshot(format!(
                "unsupported snapshot version: {}",
                snapshot.version
            )));
        }

        if snapshot.data.len() != snapshot.key_count {
            return Err(KvError::Snapshot(format!(
                "key count mismatch: expected {}, got {}",
                snapshot.key_count,
                snapshot.data.len()
            )));
        }

        Ok(())
    }
}

/// Write a snapshot of `data` to an arbitrary path (backup/export)
pub fn export(data: &HashMap<String, String>, dest: &Path) -> Result<()> {
    let snapshot = SnapshotRef {
        version: SNAPSHOT_VERSION,
        timestamp: unix_nanos(),
        key_count: data.len(),
        data,
    };

    let file =
        File::create(dest).map_err(|e| KvError::Snapshot(format!("create export file: {e}")))?;
    let mut writer = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut writer, &snapshot)
        .map_err(|e| KvError::Snapshot(format!("encode: {e}")))?;
    writer
        .flush()
        .map_err(|e| KvError::Snapshot(format!("flush: {e}")))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| KvError::Snapshot(format!("fsync: {e}")))?;

    Ok(())
}

/// Read the data payload of a snapshot at an arbitrary path
pub fn import(src: &Path) -> Result<HashMap<String, String>> {
    let file = File::open(src).map_err(|e| KvError::Snapshot(format!("open import file: {e}")))?;
    let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| KvError::Snapshot(format!("decode: {e}")))?;
    Ok(snapshot.data)
}

fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
