//! Connection Handler
//!
//! Owns the session loop for a single client: welcome banner, then
//! read a command line, execute it against the engine, write the
//! response, until QUIT or EOF.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::Engine;
use crate::error::Result;
use crate::protocol::{Command, Response};

/// Handles a single client connection
pub struct Connection {
    stream: TcpStream,
    engine: Arc<Engine>,

    /// Server-wide active connection count, reported by INFO/HEALTH
    active_connections: Arc<AtomicUsize>,

    peer: String,
}

impl Connection {
    /// Create a connection handler for an accepted stream
    pub fn new(
        stream: TcpStream,
        engine: Arc<Engine>,
        active_connections: Arc<AtomicUsize>,
    ) -> Result<Self> {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(Self {
            stream,
            engine,
            active_connections,
            peer,
        })
    }

    /// Run the session loop until the client disconnects
    pub fn handle(&mut self) -> Result<()> {
        let reader = BufReader::new(self.stream.try_clone()?);
        let mut writer = BufWriter::new(self.stream.try_clone()?);

        writer.write_all(b"+OK kvlite ready\n")?;
        writer.flush()?;

        tracing::debug!(peer = %self.peer, "client connected");

        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::debug!(peer = %self.peer, error = %e, "read error");
                    break;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            let response = self.dispatch(&line);
            writeln!(writer, "{response}")?;
            writer.flush()?;

            if response.is_goodbye() {
                break;
            }
        }

        tracing::debug!(peer = %self.peer, "client disconnected");
        Ok(())
    }

    /// Peer address for logging
    pub fn peer_addr(&self) -> &str {
        &self.peer
    }

    fn dispatch(&self, line: &str) -> Response {
        match Command::parse(line) {
            Ok(command) => self.execute(command),
            Err(message) => Response::Error(message),
        }
    }

    /// Execute a parsed command against the engine
    fn execute(&self, command: Command) -> Response {
        match command {
            Command::Ping => Response::Pong,
            Command::Quit => Response::Goodbye,

            Command::Set { key, value } => match self.engine.set(&key, &value) {
                Ok(()) => Response::Ok,
                Err(e) => Response::Error(format!("failed to set: {e}")),
            },

            Command::SetEx {
                key,
                ttl_secs,
                value,
            } => {
                let ttl = Duration::from_secs(ttl_secs as u64);
                match self.engine.set_with_ttl(&key, &value, ttl) {
                    Ok(()) => Response::Ok,
                    Err(e) => Response::Error(format!("failed to set: {e}")),
                }
            }

            Command::Get { key } => match self.engine.get(&key) {
                Ok(Some(value)) => Response::Value(value),
                Ok(None) => Response::Error("key not found".to_string()),
                Err(e) => Response::Error(format!("failed to get: {e}")),
            },

            Command::Delete { key } => match self.engine.delete(&key) {
                Ok(true) => Response::Ok,
                Ok(false) => Response::Error("key not found".to_string()),
                Err(e) => Response::Error(format!("failed to delete: {e}")),
            },

            Command::Exists { key } => match self.engine.get(&key) {
                Ok(Some(_)) => Response::Int(1),
                Ok(None) => Response::Int(0),
                Err(e) => Response::Error(format!("failed to get: {e}")),
            },

            Command::Expire { key, ttl_secs } => {
                let ttl = Duration::from_secs(ttl_secs as u64);
                match self.engine.expire(&key, ttl) {
                    Ok(true) => Response::Int(1),
                    Ok(false) => Response::Int(0),
                    Err(e) => Response::Error(format!("failed to expire: {e}")),
                }
            }

            Command::Ttl { key } => match self.engine.ttl(&key) {
                Ok(secs) => Response::Int(secs),
                Err(e) => Response::Error(format!("failed to read ttl: {e}")),
            },

            Command::Persist { key } => match self.engine.persist(&key) {
                Ok(true) => Response::Int(1),
                Ok(false) => Response::Int(0),
                Err(e) => Response::Error(format!("failed to persist: {e}")),
            },

            Command::Keys { pattern } => match self.engine.keys(&pattern) {
                Ok(keys) if keys.is_empty() => Response::Value("(empty list)".to_string()),
                Ok(keys) => Response::Value(keys.join("\n")),
                Err(e) => Response::Error(format!("failed to list keys: {e}")),
            },

            Command::Scan {
                cursor,
                pattern,
                count,
            } => match self.engine.scan(cursor, &pattern, count) {
                Ok(page) => {
                    let mut out = page.next_cursor.to_string();
                    if !page.keys.is_empty() {
                        out.push('\n');
                        out.push_str(&page.keys.join("\n"));
                    }
                    Response::Value(out)
                }
                Err(e) => Response::Error(format!("failed to scan: {e}")),
            },

            Command::MSet { pairs } => {
                for (key, value) in &pairs {
                    if let Err(e) = self.engine.set(key, value) {
                        return Response::Error(format!("failed at key {key}: {e}"));
                    }
                }
                Response::Ok
            }

            Command::MGet { keys } => {
                let mut results = Vec::with_capacity(keys.len());
                for key in &keys {
                    match self.engine.get(key) {
                        Ok(Some(value)) => results.push(value),
                        Ok(None) => results.push("(nil)".to_string()),
                        Err(e) => return Response::Error(format!("failed to get: {e}")),
                    }
                }
                Response::Value(results.join("\n"))
            }

            Command::MDel { keys } => {
                let mut deleted = 0;
                for key in &keys {
                    if let Ok(true) = self.engine.delete(key) {
                        deleted += 1;
                    }
                }
                Response::Int(deleted)
            }

            Command::Incr { key } => self.incr_by(&key, 1),
            Command::Decr { key } => self.incr_by(&key, -1),

            Command::Append { key, value } => {
                let current = match self.engine.get(&key) {
                    Ok(Some(v)) => v,
                    Ok(None) => String::new(),
                    Err(e) => return Response::Error(format!("failed to get: {e}")),
                };
                let combined = current + &value;
                match self.engine.set(&key, &combined) {
                    Ok(()) => Response::Int(combined.len() as i64),
                    Err(e) => Response::Error(format!("failed to set: {e}")),
                }
            }

            Command::Strlen { key } => match self.engine.get(&key) {
                Ok(Some(value)) => Response::Int(value.len() as i64),
                Ok(None) => Response::Int(0),
                Err(e) => Response::Error(format!("failed to get: {e}")),
            },

            Command::Clear => match self.engine.clear() {
                Ok(()) => Response::Ok,
                Err(e) => Response::Error(format!("failed to clear: {e}")),
            },

            Command::Info => {
                let keys = match self.engine.len() {
                    Ok(n) => n,
                    Err(e) => return Response::Error(format!("failed to read info: {e}")),
                };
                let wal_size = match self.engine.wal_size() {
                    Ok(size) => size,
                    Err(e) => return Response::Error(format!("failed to read wal size: {e}")),
                };
                Response::Value(format!(
                    "+OK keys={} connections={} wal_size={}",
                    keys,
                    self.active_connections.load(Ordering::Relaxed),
                    wal_size
                ))
            }

            Command::Stats => match self.engine.stats() {
                Ok(stats) => Response::Value(format!(
                    "+OK keys={} wal_size={} wal_entries={} needs_compaction={} ttl_expired={} ttl_checks={}",
                    stats.keys,
                    stats.wal_size,
                    stats.wal_entries,
                    stats.needs_compaction,
                    stats.ttl_expired,
                    stats.ttl_checks
                )),
                Err(e) => Response::Error(format!("failed to read stats: {e}")),
            },

            Command::Health => {
                let keys = self.engine.len().unwrap_or(0);
                let connections = self.active_connections.load(Ordering::Relaxed);
                let (status, wal_size, wal_healthy) = match self.engine.wal_size() {
                    Ok(size) => ("healthy", size, true),
                    Err(_) => ("degraded", 0, false),
                };
                Response::Value(format!(
                    "{{\n  \"status\": \"{status}\",\n  \"keys\": {keys},\n  \"connections\": {connections},\n  \"wal_size\": {wal_size},\n  \"wal_healthy\": {wal_healthy}\n}}"
                ))
            }

            Command::Sync => match self.engine.sync() {
                Ok(()) => Response::Ok,
                Err(e) => Response::Error(format!("failed to sync: {e}")),
            },

            Command::Compact => match self.engine.compact() {
                Ok(()) => Response::Ok,
                Err(e) => Response::Error(format!("failed to compact: {e}")),
            },

            Command::ConfigGet { param } => {
                let config = self.engine.config();
                match param.as_str() {
                    "host" => Response::Value(config.host.clone()),
                    "port" => Response::Int(config.port as i64),
                    "max_connections" => Response::Int(config.max_connections as i64),
                    _ => Response::Error("unknown config parameter".to_string()),
                }
            }
        }
    }

    /// INCR/DECR: read-modify-write through GET + SET
    fn incr_by(&self, key: &str, delta: i64) -> Response {
        let current = match self.engine.get(key) {
            Ok(Some(value)) => match value.parse::<i64>() {
                Ok(n) => n,
                Err(_) => return Response::Error("value is not an integer".to_string()),
            },
            Ok(None) => 0,
            Err(e) => return Response::Error(format!("failed to get: {e}")),
        };

        let next = match current.checked_add(delta) {
            Some(n) => n,
            None => {
                return Response::Error("increment or decrement would overflow".to_string())
            }
        };

        match self.engine.set(key, &next.to_string()) {
            Ok(()) => Response::Int(next),
            Err(e) => Response::Error(format!("failed to set: {e}")),
        }
    }
}
