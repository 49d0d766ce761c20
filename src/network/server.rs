//! TCP Server
//!
//! Accepts connections and hands each one to its own worker thread.

use std::io::Write;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::sync::WaitGroup;

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{KvError, Result};

use super::Connection;

/// TCP server for kvlite
///
/// ## Architecture
/// - The acceptor thread polls a non-blocking listener so it can
///   notice the shutdown flag between accepts
/// - Every accepted connection runs on its own worker thread
/// - All workers share the Engine and the active-connection counter
pub struct Server {
    config: Config,
    engine: Arc<Engine>,
    listener: TcpListener,
    shutdown: Arc<AtomicBool>,
    active_connections: Arc<AtomicUsize>,
}

/// Handle for requesting a graceful shutdown from another thread
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: Arc<AtomicBool>,
}

impl ServerHandle {
    /// Stop accepting connections and let in-flight sessions finish
    pub fn shutdown(&self) {
        tracing::info!("shutdown signal received");
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Server {
    /// Bind to the configured address
    ///
    /// Binding happens here (not in `run`) so callers can read the
    /// actual address when the configured port is 0.
    pub fn bind(config: Config, engine: Arc<Engine>) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.address()).map_err(|e| {
            KvError::Network(format!("failed to bind to {}: {e}", config.address()))
        })?;

        // Non-blocking so the accept loop can poll the shutdown flag.
        listener.set_nonblocking(true)?;

        Ok(Self {
            config,
            engine,
            listener,
            shutdown: Arc::new(AtomicBool::new(false)),
            active_connections: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The bound address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle for shutting the server down from another thread
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: Arc::clone(&self.shutdown),
        }
    }

    /// Number of active connections
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Accept connections until shutdown is signaled (blocking)
    ///
    /// On shutdown the listener stops accepting and the call waits for
    /// every connection worker to finish its session.
    pub fn run(&mut self) -> Result<()> {
        tracing::info!(
            "kvlite server listening on {}",
            self.local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| self.config.address())
        );

        let workers = WaitGroup::new();

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    let current = self.active_connections.load(Ordering::Relaxed);
                    if self.config.max_connections > 0 && current >= self.config.max_connections {
                        tracing::warn!(
                            current,
                            limit = self.config.max_connections,
                            peer = %addr,
                            "connection limit reached, rejecting"
                        );
                        let mut stream = stream;
                        let _ = stream.write_all(b"-ERR connection limit reached\n");
                        continue;
                    }

                    self.spawn_worker(stream, workers.clone());
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    // No pending connections
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    if !self.shutdown.load(Ordering::Relaxed) {
                        tracing::error!(error = %e, "accept error");
                    }
                }
            }
        }

        tracing::info!("shutting down server, waiting for workers");
        workers.wait();
        tracing::info!("server shutdown complete");
        Ok(())
    }

    fn spawn_worker(&self, stream: std::net::TcpStream, wg: WaitGroup) {
        // Accepted streams inherit the listener's non-blocking flag on
        // some platforms; session reads must block.
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::error!(error = %e, "failed to configure stream");
            return;
        }

        let engine = Arc::clone(&self.engine);
        let counter = Arc::clone(&self.active_connections);
        counter.fetch_add(1, Ordering::Relaxed);

        let spawned = thread::Builder::new()
            .name("kvlite-conn".to_string())
            .spawn(move || {
                let _wg = wg;

                match Connection::new(stream, engine, Arc::clone(&counter)) {
                    Ok(mut conn) => {
                        if let Err(e) = conn.handle() {
                            tracing::debug!(
                                peer = conn.peer_addr(),
                                error = %e,
                                "connection ended with error"
                            );
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "failed to create connection"),
                }

                counter.fetch_sub(1, Ordering::Relaxed);
            });

        if let Err(e) = spawned {
            tracing::error!(error = %e, "failed to spawn connection worker");
            self.active_connections.fetch_sub(1, Ordering::Relaxed);
        }
    }
}
