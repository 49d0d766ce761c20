//! Engine Module
//!
//! The core storage engine that coordinates all components: keyspace,
//! WAL, snapshot store, TTL sweeper, and the background compaction
//! checker.
//!
//! ## Responsibilities
//! - Enforce durability ordering: a mutating op is appended and
//!   flushed to the WAL before the keyspace changes, and the WAL mutex
//!   is held across that pair so WAL order equals apply order
//! - Recover on open: snapshot import, then WAL replay
//! - Compact: snapshot the keyspace, then truncate the WAL
//! - Lifecycle: Init -> Recovering -> Running -> Closing -> Closed

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{bounded, tick, Sender};
use crossbeam::select;
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::snapshot::SnapshotStore;
use crate::store::{Keyspace, ScanPage};
use crate::ttl::{TtlStats, TtlSweeper};
use crate::wal::{self, Op, Record, Wal};

/// Engine lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum State {
    Init = 0,
    Recovering = 1,
    Running = 2,
    Closing = 3,
    Closed = 4,
}

/// Point-in-time engine statistics (the STATS command)
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub keys: usize,
    pub wal_size: u64,
    pub wal_entries: u64,
    pub needs_compaction: bool,
    pub ttl_expired: u64,
    pub ttl_checks: u64,
}

/// Handle to the background compaction checker thread
struct CompactionChecker {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl CompactionChecker {
    fn stop(&mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            // The last engine handle can be the checker's own upgrade,
            // in which case Drop runs on the checker thread and joining
            // it would deadlock.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
            tracing::debug!("compaction checker stopped");
        }
    }
}

/// The main storage engine
///
/// Free-threaded: share it behind an `Arc` across connection workers.
pub struct Engine {
    config: Config,

    /// In-memory state; shared with the TTL sweeper thread
    keyspace: Arc<Keyspace>,

    /// WAL writer; the mutex serializes the append-then-apply pair of
    /// every mutating op and is held for the whole of compaction
    wal: Mutex<Wal>,

    snapshots: SnapshotStore,

    /// Records appended since the last truncation
    wal_entries: AtomicU64,

    state: AtomicU8,

    sweeper: Mutex<Option<TtlSweeper>>,
    compactor: Mutex<Option<CompactionChecker>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Open an engine on the configured data directory
    ///
    /// Recovers from snapshot + WAL if they exist, then starts the TTL
    /// sweeper and the compaction checker. Recovery failure is fatal:
    /// the engine refuses to serve from a partially recovered state.
    pub fn open(config: Config) -> Result<Arc<Self>> {
        config.validate()?;

        let keyspace = Arc::new(Keyspace::new());
        let wal = Wal::open(&config.data_dir, config.sync_mode)?;
        let snapshots = SnapshotStore::new(&config.data_dir)?;

        let engine = Self {
            config,
            keyspace,
            wal: Mutex::new(wal),
            snapshots,
            wal_entries: AtomicU64::new(0),
            state: AtomicU8::new(State::Init as u8),
            sweeper: Mutex::new(None),
            compactor: Mutex::new(None),
        };

        engine.state.store(State::Recovering as u8, Ordering::Release);
        engine.recover()?;

        let engine = Arc::new(engine);

        let sweeper = TtlSweeper::start(
            Arc::clone(&engine.keyspace),
            engine.config.ttl_check_interval,
        )?;
        *engine.sweeper.lock() = Some(sweeper);

        let checker = spawn_compaction_checker(&engine, engine.config.compaction_interval)?;
        *engine.compactor.lock() = Some(checker);

        engine.state.store(State::Running as u8, Ordering::Release);
        Ok(engine)
    }

    /// Load the snapshot (if any) and replay the WAL into the keyspace
    fn recover(&self) -> Result<()> {
        tracing::info!("starting recovery");

        let snapshot = self
            .snapshots
            .load()
            .map_err(|e| KvError::Recovery(format!("load snapshot: {e}")))?;

        match snapshot {
            Some(snap) => {
                tracing::info!(keys = snap.key_count, "loading snapshot");
                for (key, value) in snap.data {
                    self.keyspace.set(key, value);
                }
            }
            None => tracing::info!("no snapshot found, starting fresh"),
        }

        let wal_path = self.wal.lock().path().to_path_buf();
        let keyspace = &self.keyspace;
        let replayed = wal::replay(&wal_path, |record| {
            match record.op {
                Op::Set => keyspace.set(record.key, record.value),
                Op::Delete => {
                    keyspace.delete(&record.key);
                }
                // A CLEAR in the log discards everything loaded before
                // it, snapshot contents included.
                Op::Clear => keyspace.clear(),
            }
            Ok(())
        })
        .map_err(|e| match e {
            corrupt @ KvError::WalCorrupt { .. } => corrupt,
            other => KvError::Recovery(format!("WAL replay: {other}")),
        })?;

        self.wal_entries.store(replayed as u64, Ordering::Relaxed);

        tracing::info!(
            keys = self.keyspace.len(),
            replayed,
            "recovery complete"
        );
        Ok(())
    }

    fn ensure_running(&self) -> Result<()> {
        if self.state.load(Ordering::Acquire) == State::Running as u8 {
            Ok(())
        } else {
            Err(KvError::Closed)
        }
    }

    // -------------------------------------------------------------------------
    // Mutating operations (WAL first, then keyspace, then ack)
    // -------------------------------------------------------------------------

    /// Store a persistent key-value pair
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.ensure_running()?;
        let record = Record::new(Op::Set, key, value);
        {
            let mut wal = self.wal.lock();
            wal.append(&record)?;
            self.keyspace.set(key, value);
        }
        self.wal_entries.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Store a key-value pair that expires after `ttl`
    ///
    /// The WAL record carries only the key and value; the expiry lives
    /// in memory and does not survive a restart (see DESIGN.md).
    pub fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.ensure_running()?;
        let record = Record::new(Op::Set, key, value);
        {
            let mut wal = self.wal.lock();
            wal.append(&record)?;
            self.keyspace.set_with_ttl(key, value, ttl);
        }
        self.wal_entries.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Remove a key; Ok(false) if it was absent (nothing is logged)
    pub fn delete(&self, key: &str) -> Result<bool> {
        self.ensure_running()?;

        // Lazy-expires as a side effect; an expired key is absent.
        if self.keyspace.get(key).is_none() {
            return Ok(false);
        }

        let record = Record::new(Op::Delete, key, "");
        {
            let mut wal = self.wal.lock();
            wal.append(&record)?;
            self.keyspace.delete(key);
        }
        self.wal_entries.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Remove every key
    pub fn clear(&self) -> Result<()> {
        self.ensure_running()?;
        let record = Record::new(Op::Clear, "", "");
        {
            let mut wal = self.wal.lock();
            wal.append(&record)?;
            self.keyspace.clear();
        }
        self.wal_entries.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Read operations
    // -------------------------------------------------------------------------

    /// Get a value by key (lazily expiring it if stale)
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.ensure_running()?;
        Ok(self.keyspace.get(key))
    }

    /// Set a TTL on an existing key; expiry is not WAL-logged
    pub fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.ensure_running()?;
        Ok(self.keyspace.expire(key, ttl))
    }

    /// Remove the TTL from a key
    pub fn persist(&self, key: &str) -> Result<bool> {
        self.ensure_running()?;
        Ok(self.keyspace.persist(key))
    }

    /// Remaining TTL: -2 absent, -1 persistent, otherwise seconds
    pub fn ttl(&self, key: &str) -> Result<i64> {
        self.ensure_running()?;
        Ok(self.keyspace.ttl(key))
    }

    /// All live keys matching the glob pattern
    pub fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.ensure_running()?;
        Ok(self.keyspace.keys(pattern))
    }

    /// Paginated keys matching the glob pattern
    pub fn scan(&self, cursor: usize, pattern: &str, count: usize) -> Result<ScanPage> {
        self.ensure_running()?;
        Ok(self.keyspace.scan(cursor, pattern, count))
    }

    /// Number of live keys
    pub fn len(&self) -> Result<usize> {
        self.ensure_running()?;
        Ok(self.keyspace.len())
    }

    /// Whether the keyspace holds no live keys
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    // -------------------------------------------------------------------------
    // Durability operations
    // -------------------------------------------------------------------------

    /// Flush and fsync the WAL
    pub fn sync(&self) -> Result<()> {
        self.ensure_running()?;
        self.wal.lock().sync()
    }

    /// Current WAL file size in bytes
    pub fn wal_size(&self) -> Result<u64> {
        self.ensure_running()?;
        self.wal.lock().size()
    }

    /// Records appended since the last truncation
    pub fn wal_entries(&self) -> u64 {
        self.wal_entries.load(Ordering::Relaxed)
    }

    /// Whether either compaction threshold has been crossed
    pub fn needs_compaction(&self) -> bool {
        if self.wal_entries() >= self.config.max_wal_entries {
            return true;
        }
        match self.wal.lock().size() {
            Ok(size) => size >= self.config.max_wal_size,
            Err(_) => false,
        }
    }

    /// Write a snapshot of the keyspace and truncate the WAL
    ///
    /// Holds the WAL mutex throughout, so no mutating op can slip
    /// between the snapshot and the truncation. If the snapshot write
    /// fails the WAL is left untouched and the previous snapshot (if
    /// any) remains authoritative.
    pub fn compact(&self) -> Result<()> {
        self.ensure_running()?;

        let start = Instant::now();
        let mut wal = self.wal.lock();

        let data = self.keyspace.export();
        self.snapshots.write(&data)?;

        wal.truncate()?;
        self.wal_entries.store(0, Ordering::Relaxed);

        tracing::info!(
            keys = data.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "compaction complete"
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// TTL sweeper statistics
    pub fn ttl_stats(&self) -> TtlStats {
        self.sweeper
            .lock()
            .as_ref()
            .map(|s| s.stats())
            .unwrap_or_default()
    }

    /// Engine statistics for STATS
    ///
    /// A WAL size read failure propagates instead of being reported
    /// as zero.
    pub fn stats(&self) -> Result<EngineStats> {
        self.ensure_running()?;

        let wal_size = self.wal.lock().size()?;
        let wal_entries = self.wal_entries();
        let ttl = self.ttl_stats();

        Ok(EngineStats {
            keys: self.keyspace.len(),
            wal_size,
            wal_entries,
            needs_compaction: wal_entries >= self.config.max_wal_entries
                || wal_size >= self.config.max_wal_size,
            ttl_expired: ttl.total_expired,
            ttl_checks: ttl.checks_performed,
        })
    }

    /// The configuration this engine was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Stop background workers, flush the WAL, and reject further ops
    ///
    /// Idempotent; only the first caller performs the shutdown.
    pub fn close(&self) -> Result<()> {
        if self
            .state
            .compare_exchange(
                State::Running as u8,
                State::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(());
        }

        tracing::info!("closing engine");

        if let Some(mut checker) = self.compactor.lock().take() {
            checker.stop();
        }
        if let Some(mut sweeper) = self.sweeper.lock().take() {
            sweeper.stop();
        }

        self.wal.lock().sync()?;

        self.state.store(State::Closed as u8, Ordering::Release);
        tracing::info!("engine closed");
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Spawn the background thread that triggers compaction when the WAL
/// crosses a threshold
///
/// Holds only a weak reference: once every user handle is gone the
/// checker winds itself down on the next tick.
fn spawn_compaction_checker(
    engine: &Arc<Engine>,
    interval: Duration,
) -> Result<CompactionChecker> {
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let weak: Weak<Engine> = Arc::downgrade(engine);

    let handle = thread::Builder::new()
        .name("kvlite-compactor".to_string())
        .spawn(move || {
            let ticker = tick(interval);
            loop {
                select! {
                    recv(ticker) -> _ => {
                        let Some(engine) = weak.upgrade() else { break };
                        if engine.needs_compaction() {
                            tracing::info!("compaction triggered by background checker");
                            if let Err(e) = engine.compact() {
                                tracing::warn!(error = %e, "compaction failed");
                            }
                        }
                    }
                    recv(stop_rx) -> _ => break,
                }
            }
        })?;

    tracing::debug!(interval = ?interval, "compaction checker started");

    Ok(CompactionChecker {
        stop: stop_tx,
        handle: Some(handle),
    })
}
