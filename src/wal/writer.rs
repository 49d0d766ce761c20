//! WAL writer
//!
//! Owns the append-mode file handle. Serialization of appends is the
//! engine's job (it wraps the writer in a mutex and holds it across
//! the append-then-apply pair).

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{KvError, Result};

use super::Record;

/// WAL file name inside the data directory
pub const WAL_FILE: &str = "kvlite.wal";

/// Append-only write-ahead log
pub struct Wal {
    /// Buffered file writer; flushed on every append
    writer: BufWriter<File>,

    /// Full path to the WAL file
    path: PathBuf,

    /// fsync after every append
    sync_mode: bool,
}

impl Wal {
    /// Open (creating if absent) the WAL file under `dir`
    ///
    /// The directory is created if missing. The file is opened in
    /// append mode so existing records are preserved for replay.
    pub fn open(dir: &Path, sync_mode: bool) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(WAL_FILE);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            sync_mode,
        })
    }

    /// Append a record: encode, write to the buffer, flush to the OS
    ///
    /// In sync mode the record is additionally fsynced before this
    /// returns. On any failure the caller must treat the record as not
    /// written and leave the keyspace untouched.
    pub fn append(&mut self, record: &Record) -> Result<()> {
        let encoded = record.encode();

        self.writer
            .write_all(encoded.as_bytes())
            .map_err(|e| KvError::WalWrite(format!("write: {e}")))?;

        self.writer
            .flush()
            .map_err(|e| KvError::WalWrite(format!("flush: {e}")))?;

        if self.sync_mode {
            self.writer
                .get_ref()
                .sync_all()
                .map_err(|e| KvError::WalWrite(format!("fsync: {e}")))?;
        }

        Ok(())
    }

    /// Flush the buffer and fsync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| KvError::WalWrite(format!("flush: {e}")))?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|e| KvError::WalWrite(format!("fsync: {e}")))?;
        Ok(())
    }

    /// Reset the WAL to length zero, keeping the handle usable
    ///
    /// Called after a snapshot has been durably written; the logged
    /// operations are covered by the snapshot from here on.
    pub fn truncate(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| KvError::WalWrite(format!("flush: {e}")))?;

        let file = self.writer.get_mut();
        file.set_len(0)
            .map_err(|e| KvError::WalWrite(format!("truncate: {e}")))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| KvError::WalWrite(format!("seek: {e}")))?;

        Ok(())
    }

    /// Current size of the WAL file in bytes
    pub fn size(&self) -> Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Path to the WAL file
    pub fn path(&self) -> &Path {
        &self.path
    }
}
