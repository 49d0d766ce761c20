//! Client connection pool
//!
//! A bounded set of reusable connections to one server. Idle
//! connections sit in a FIFO; `get` prefers an idle connection
//! (liveness-checked) and dials a new one otherwise, subject to
//! `max_active`.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{KvError, Result};

/// Options for creating a Pool
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Server address (host:port)
    pub addr: String,

    /// Max idle connections kept for reuse
    pub max_idle: usize,

    /// Max connections alive at once (0 = unlimited)
    pub max_active: usize,

    /// Dial timeout
    pub connect_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            addr: String::new(),
            max_idle: 5,
            max_active: 0,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Connections currently alive (idle + checked out)
    pub active: usize,

    /// Connections sitting idle in the pool
    pub idle: usize,
}

struct PoolInner {
    idle: VecDeque<PooledConn>,
    active: usize,
    closed: bool,
}

/// A pool of client connections to a kvlite server
pub struct Pool {
    addr: String,
    max_idle: usize,
    max_active: usize,
    connect_timeout: Duration,
    inner: Mutex<PoolInner>,
}

impl Pool {
    /// Create a pool (no connections are dialed until `get`)
    pub fn new(opts: PoolOptions) -> Result<Self> {
        if opts.addr.is_empty() {
            return Err(KvError::Config("pool addr is required".to_string()));
        }

        let max_idle = if opts.max_idle == 0 { 5 } else { opts.max_idle };

        Ok(Self {
            addr: opts.addr,
            max_idle,
            max_active: opts.max_active,
            connect_timeout: opts.connect_timeout,
            inner: Mutex::new(PoolInner {
                idle: VecDeque::new(),
                active: 0,
                closed: false,
            }),
        })
    }

    /// Get a connection: an idle one if available and alive, otherwise
    /// a freshly dialed one
    ///
    /// Fails with `PoolExhausted` when `max_active` connections are
    /// already out and none are idle, or `PoolClosed` after `close`.
    pub fn get(&self) -> Result<PooledConn> {
        let mut inner = self.inner.lock();

        if inner.closed {
            return Err(KvError::PoolClosed);
        }

        while let Some(mut conn) = inner.idle.pop_front() {
            if conn.is_alive() {
                return Ok(conn);
            }
            // Dead idle connection: drop it and fall through.
            inner.active -= 1;
        }

        if self.max_active > 0 && inner.active >= self.max_active {
            return Err(KvError::PoolExhausted);
        }

        // Dialing under the lock keeps the active count exact; the
        // dial is bounded by connect_timeout.
        let conn = self.dial()?;
        inner.active += 1;
        Ok(conn)
    }

    /// Return a connection to the idle set
    ///
    /// If the idle set is full the connection is closed instead.
    pub fn put(&self, conn: PooledConn) {
        let mut inner = self.inner.lock();

        if inner.closed || inner.idle.len() >= self.max_idle {
            inner.active -= 1;
            drop(conn);
            return;
        }

        inner.idle.push_back(conn);
    }

    /// Close the pool and every idle connection (idempotent)
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;

        let idle = std::mem::take(&mut inner.idle);
        inner.active -= idle.len();
        drop(idle);
    }

    /// Current pool statistics
    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            active: inner.active,
            idle: inner.idle.len(),
        }
    }

    fn dial(&self) -> Result<PooledConn> {
        let addr = self
            .addr
            .to_socket_addrs()
            .map_err(|e| KvError::Network(format!("resolve {}: {e}", self.addr)))?
            .next()
            .ok_or_else(|| KvError::Network(format!("no address for {}", self.addr)))?;

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .map_err(|e| KvError::Network(format!("connect to {}: {e}", self.addr)))?;
        stream.set_nodelay(true)?;

        let mut conn = PooledConn::new(stream)?;

        // Consume the welcome banner before handing the connection out.
        let welcome = conn.read_line()?;
        if !welcome.starts_with("+OK") {
            return Err(KvError::Protocol(format!(
                "unexpected welcome from server: {welcome}"
            )));
        }

        Ok(conn)
    }
}

/// One pooled client connection
pub struct PooledConn {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl PooledConn {
    fn new(stream: TcpStream) -> Result<Self> {
        let reader = BufReader::new(stream.try_clone()?);
        Ok(Self { stream, reader })
    }

    /// Send a command and read a single-line response
    pub fn command(&mut self, cmd: &str, args: &[&str]) -> Result<String> {
        self.send(cmd, args)?;
        self.read_line()
    }

    /// Send a command and read exactly `lines` response lines
    ///
    /// Multi-value responses (MGET) are `n` newline-separated lines in
    /// one logical response; the caller must know `n` up front.
    pub fn command_lines(&mut self, cmd: &str, args: &[&str], lines: usize) -> Result<Vec<String>> {
        self.send(cmd, args)?;

        let mut out = Vec::with_capacity(lines);
        for _ in 0..lines {
            let line = self.read_line()?;
            // A single error line replaces the whole multi-line body.
            if out.is_empty() && line.starts_with("-ERR") {
                out.push(line);
                return Ok(out);
            }
            out.push(line);
        }
        Ok(out)
    }

    /// Send a command followed by QUIT and read every response line
    /// until the server says goodbye
    ///
    /// For responses whose line count the caller cannot know up front
    /// (KEYS). Consumes the connection; the server closes it after
    /// QUIT.
    pub fn command_drain(mut self, cmd: &str, args: &[&str]) -> Result<Vec<String>> {
        self.send(cmd, args)?;
        self.send("QUIT", &[])?;

        let mut lines = Vec::new();
        loop {
            let mut line = String::new();
            let read = self
                .reader
                .read_line(&mut line)
                .map_err(|e| KvError::Network(format!("read: {e}")))?;
            if read == 0 {
                break;
            }
            let line = line.trim_end_matches(['\n', '\r']).to_string();
            if line == "+OK goodbye" {
                break;
            }
            lines.push(line);
        }
        Ok(lines)
    }

    fn send(&mut self, cmd: &str, args: &[&str]) -> Result<()> {
        let mut request = String::from(cmd);
        for arg in args {
            request.push(' ');
            request.push_str(arg);
        }
        request.push('\n');

        self.stream
            .write_all(request.as_bytes())
            .map_err(|e| KvError::Network(format!("send: {e}")))?;
        self.stream
            .flush()
            .map_err(|e| KvError::Network(format!("flush: {e}")))?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .map_err(|e| KvError::Network(format!("read: {e}")))?;
        if read == 0 {
            return Err(KvError::Network("connection closed by server".to_string()));
        }
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }

    /// Probe whether the connection is still usable
    ///
    /// Sets a 100 ms read deadline and tries a 1-byte read: a timeout
    /// means the peer is idle and the connection is healthy; a
    /// successful read or any other error means it must be discarded.
    fn is_alive(&mut self) -> bool {
        if self
            .stream
            .set_read_timeout(Some(Duration::from_millis(100)))
            .is_err()
        {
            return false;
        }

        let mut buf = [0u8; 1];
        let alive = match (&self.stream).read(&mut buf) {
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                true
            }
            _ => false,
        };

        if self.stream.set_read_timeout(None).is_err() {
            return false;
        }

        alive
    }
}
