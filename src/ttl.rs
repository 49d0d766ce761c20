//! TTL Sweeper
//!
//! Background reclamation of expired keys. Lazy expiration on `get`
//! already guarantees no client observes an expired value; the sweeper
//! bounds how long unread expired entries linger.
//!
//! The sweeper never writes to the WAL: expiration is derived from the
//! original SET/SETEX, not an operation in its own right.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

use crossbeam::channel::{bounded, tick, Sender};
use crossbeam::select;
use parking_lot::Mutex;

use crate::error::Result;
use crate::store::Keyspace;

/// Expiration statistics
#[derive(Debug, Clone, Default)]
pub struct TtlStats {
    /// Keys reclaimed since the sweeper started
    pub total_expired: u64,

    /// When the last sweep ran
    pub last_check: Option<SystemTime>,

    /// Keys reclaimed by the last sweep
    pub last_expired: usize,

    /// Sweeps performed
    pub checks_performed: u64,
}

/// Background task that periodically reaps expired keys
pub struct TtlSweeper {
    stats: Arc<Mutex<TtlStats>>,
    keyspace: Arc<Keyspace>,
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl TtlSweeper {
    /// Start sweeping `keyspace` every `check_interval`
    pub fn start(keyspace: Arc<Keyspace>, check_interval: Duration) -> Result<Self> {
        let stats = Arc::new(Mutex::new(TtlStats::default()));
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let thread_keyspace = Arc::clone(&keyspace);
        let thread_stats = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name("kvlite-ttl".to_string())
            .spawn(move || {
                let ticker = tick(check_interval);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            sweep(&thread_keyspace, &thread_stats);
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
            })?;

        tracing::debug!(interval = ?check_interval, "TTL sweeper started");

        Ok(Self {
            stats,
            keyspace,
            stop: stop_tx,
            handle: Some(handle),
        })
    }

    /// Snapshot of the current statistics
    pub fn stats(&self) -> TtlStats {
        self.stats.lock().clone()
    }

    /// Run a sweep immediately; returns how many keys were reclaimed
    pub fn force_check(&self) -> usize {
        sweep(&self.keyspace, &self.stats);
        self.stats.lock().last_expired
    }

    /// Stop the sweeper and wait for the thread to exit
    ///
    /// After this returns no sweep is in flight.
    pub fn stop(&mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            tracing::debug!("TTL sweeper stopped");
        }
    }
}

impl Drop for TtlSweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sweep(keyspace: &Keyspace, stats: &Mutex<TtlStats>) {
    let start = SystemTime::now();
    let deleted = keyspace.delete_expired();

    let mut stats = stats.lock();
    stats.total_expired += deleted as u64;
    stats.last_check = Some(start);
    stats.last_expired = deleted;
    stats.checks_performed += 1;
    drop(stats);

    if deleted > 0 {
        tracing::debug!(deleted, "expired keys reclaimed");
    }
}
