//! High-level client over the connection pool

use std::time::Duration;

use crate::error::{KvError, Result};

use super::{Pool, PoolOptions, PoolStats};

/// A kvlite client backed by a connection pool
pub struct Client {
    pool: Pool,
}

impl Client {
    /// Connect to a server with pool defaults (10 idle, 50 active)
    pub fn connect(addr: impl Into<String>) -> Result<Self> {
        let pool = Pool::new(PoolOptions {
            addr: addr.into(),
            max_idle: 10,
            max_active: 50,
            connect_timeout: Duration::from_secs(5),
        })?;
        Ok(Self { pool })
    }

    /// Store a key-value pair
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.pool.get()?;
        let response = conn.command("SET", &[key, value])?;
        self.pool.put(conn);

        if response != "+OK" {
            return Err(check_error(response));
        }
        Ok(())
    }

    /// Store a key-value pair with a TTL in seconds
    pub fn set_ex(&self, key: &str, ttl_secs: u64, value: &str) -> Result<()> {
        let mut conn = self.pool.get()?;
        let ttl = ttl_secs.to_string();
        let response = conn.command("SETEX", &[key, &ttl, value])?;
        self.pool.put(conn);

        if response != "+OK" {
            return Err(check_error(response));
        }
        Ok(())
    }

    /// Retrieve a value by key
    pub fn get(&self, key: &str) -> Result<String> {
        let mut conn = self.pool.get()?;
        let response = conn.command("GET", &[key])?;
        self.pool.put(conn);

        if response.starts_with("-ERR") {
            return Err(check_error(response));
        }
        Ok(response)
    }

    /// Delete a key
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.pool.get()?;
        let response = conn.command("DELETE", &[key])?;
        self.pool.put(conn);

        if response.starts_with("-ERR") {
            return Err(check_error(response));
        }
        Ok(())
    }

    /// Store several key-value pairs in one round trip
    pub fn mset(&self, pairs: &[(&str, &str)]) -> Result<()> {
        let mut args = Vec::with_capacity(pairs.len() * 2);
        for (key, value) in pairs {
            args.push(*key);
            args.push(*value);
        }

        let mut conn = self.pool.get()?;
        let response = conn.command("MSET", &args)?;
        self.pool.put(conn);

        if response != "+OK" {
            return Err(check_error(response));
        }
        Ok(())
    }

    /// Retrieve several values in one round trip
    ///
    /// The server answers with one line per key; missing keys come
    /// back as the literal `(nil)`.
    pub fn mget(&self, keys: &[&str]) -> Result<Vec<String>> {
        let mut conn = self.pool.get()?;
        let lines = conn.command_lines("MGET", keys, keys.len())?;
        self.pool.put(conn);

        if let Some(first) = lines.first() {
            if first.starts_with("-ERR") {
                return Err(check_error(first.clone()));
            }
        }
        Ok(lines)
    }

    /// Increment an integer key; returns the new value
    pub fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.pool.get()?;
        let response = conn.command("INCR", &[key])?;
        self.pool.put(conn);

        if response.starts_with("-ERR") {
            return Err(check_error(response));
        }
        response
            .parse()
            .map_err(|_| KvError::Protocol(format!("unexpected INCR response: {response}")))
    }

    /// Check the server is responding
    pub fn ping(&self) -> Result<()> {
        let mut conn = self.pool.get()?;
        let response = conn.command("PING", &[])?;
        self.pool.put(conn);

        if response != "+PONG" {
            return Err(check_error(response));
        }
        Ok(())
    }

    /// Pool statistics
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Close the client and its pool
    pub fn close(&self) {
        self.pool.close();
    }
}

/// Map a `-ERR` response line to an error value
fn check_error(response: String) -> KvError {
    if response == "-ERR key not found" {
        KvError::KeyNotFound
    } else if let Some(message) = response.strip_prefix("-ERR ") {
        KvError::Protocol(message.to_string())
    } else {
        KvError::Protocol(format!("unexpected response: {response}"))
    }
}
