//! End-to-end tests over live TCP
//!
//! Each test starts a real server on an ephemeral loopback port and
//! drives it through the text protocol, the way a client would.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tempfile::TempDir;

use kvlite::network::{Server, ServerHandle};
use kvlite::{Config, Engine};

// =============================================================================
// Helper Functions
// =============================================================================

struct TestServer {
    addr: SocketAddr,
    handle: ServerHandle,
    engine: Arc<Engine>,
    join: Option<JoinHandle<()>>,
}

impl TestServer {
    fn start(data_dir: &Path) -> Self {
        let config = Config::builder()
            .host("127.0.0.1")
            .port(0)
            .data_dir(data_dir)
            .build();
        Self::start_with(config)
    }

    fn start_with(config: Config) -> Self {
        let engine = Engine::open(config.clone()).unwrap();
        let mut server = Server::bind(config, Arc::clone(&engine)).unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.handle();
        let join = thread::spawn(move || server.run().unwrap());

        Self {
            addr,
            handle,
            engine,
            join: Some(join),
        }
    }

    /// Graceful stop; all clients must be dropped first
    fn stop(mut self) {
        self.handle.shutdown();
        self.join.take().unwrap().join().unwrap();
        self.engine.close().unwrap();
    }
}

struct TestClient {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl TestClient {
    fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        let mut welcome = String::new();
        reader.read_line(&mut welcome).unwrap();
        assert_eq!(welcome, "+OK kvlite ready\n");

        Self { stream, reader }
    }

    /// Send a command and read a single-line response
    fn send(&mut self, line: &str) -> String {
        self.stream
            .write_all(format!("{line}\n").as_bytes())
            .unwrap();
        self.read_line()
    }

    /// Send a command and read exactly `n` response lines
    fn send_lines(&mut self, line: &str, n: usize) -> Vec<String> {
        self.stream
            .write_all(format!("{line}\n").as_bytes())
            .unwrap();
        (0..n).map(|_| self.read_line()).collect()
    }

    fn read_line(&mut self) -> String {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).unwrap();
        assert!(read > 0, "server closed the connection unexpectedly");
        line.trim_end().to_string()
    }
}

// =============================================================================
// End-to-End Scenarios
// =============================================================================

#[test]
fn test_basic_set_get_delete() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path());
    let mut client = TestClient::connect(server.addr);

    assert_eq!(client.send("SET name Alice"), "+OK");
    assert_eq!(client.send("GET name"), "Alice");
    assert_eq!(client.send("DELETE name"), "+OK");
    assert_eq!(client.send("GET name"), "-ERR key not found");

    drop(client);
    server.stop();
}

#[test]
fn test_multi_word_value() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path());
    let mut client = TestClient::connect(server.addr);

    assert_eq!(client.send("SET greeting hello world from kvlite"), "+OK");
    assert_eq!(client.send("GET greeting"), "hello world from kvlite");

    drop(client);
    server.stop();
}

#[test]
fn test_ttl_expiration_over_wire() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path());
    let mut client = TestClient::connect(server.addr);

    assert_eq!(client.send("SETEX s 1 x"), "+OK");
    assert_eq!(client.send("GET s"), "x");

    thread::sleep(Duration::from_secs(2));

    assert_eq!(client.send("GET s"), "-ERR key not found");
    assert_eq!(client.send("TTL s"), "-2");

    drop(client);
    server.stop();
}

#[test]
fn test_persistence_across_restart() {
    let temp = TempDir::new().unwrap();

    {
        let server = TestServer::start(temp.path());
        let mut client = TestClient::connect(server.addr);
        assert_eq!(client.send("SET persist test_value"), "+OK");
        assert_eq!(client.send("QUIT"), "+OK goodbye");
        drop(client);
        server.stop();
    }

    let server = TestServer::start(temp.path());
    let mut client = TestClient::connect(server.addr);
    assert_eq!(client.send("GET persist"), "test_value");

    drop(client);
    server.stop();
}

#[test]
fn test_counter_scenario() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path());
    let mut client = TestClient::connect(server.addr);

    assert_eq!(client.send("INCR counter"), "1");
    assert_eq!(client.send("INCR counter"), "2");
    assert_eq!(client.send("SET counter hello"), "+OK");
    assert_eq!(client.send("INCR counter"), "-ERR value is not an integer");
    assert_eq!(client.send("GET counter"), "hello");
    assert_eq!(client.send("DECR other"), "-1");

    drop(client);
    server.stop();
}

#[test]
fn test_pattern_keys_scenario() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path());
    let mut client = TestClient::connect(server.addr);

    assert_eq!(client.send("MSET user:1 a user:2 b config:x c"), "+OK");

    let mut users = client.send_lines("KEYS user:*", 2);
    users.sort();
    assert_eq!(users, vec!["user:1", "user:2"]);

    assert_eq!(client.send("KEYS config:*"), "config:x");
    assert_eq!(client.send("KEYS nomatch:*"), "(empty list)");

    drop(client);
    server.stop();
}

// =============================================================================
// Command Coverage
// =============================================================================

#[test]
fn test_exists_strlen_append() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path());
    let mut client = TestClient::connect(server.addr);

    assert_eq!(client.send("EXISTS key"), "0");
    assert_eq!(client.send("STRLEN key"), "0");

    assert_eq!(client.send("APPEND key Hello"), "5");
    assert_eq!(client.send("APPEND key World"), "10");
    assert_eq!(client.send("GET key"), "HelloWorld");

    assert_eq!(client.send("EXISTS key"), "1");
    assert_eq!(client.send("STRLEN key"), "10");

    drop(client);
    server.stop();
}

#[test]
fn test_expire_persist_ttl_over_wire() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path());
    let mut client = TestClient::connect(server.addr);

    assert_eq!(client.send("SET key value"), "+OK");
    assert_eq!(client.send("TTL key"), "-1");

    assert_eq!(client.send("EXPIRE key 100"), "1");
    let ttl: i64 = client.send("TTL key").parse().unwrap();
    assert!((1..=100).contains(&ttl));

    assert_eq!(client.send("PERSIST key"), "1");
    assert_eq!(client.send("TTL key"), "-1");

    assert_eq!(client.send("EXPIRE missing 100"), "0");
    assert_eq!(client.send("PERSIST missing"), "0");
    assert_eq!(client.send("EXPIRE key 0"), "-ERR invalid TTL");

    drop(client);
    server.stop();
}

#[test]
fn test_mget_mdel() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path());
    let mut client = TestClient::connect(server.addr);

    assert_eq!(client.send("MSET a 1 b 2"), "+OK");

    let values = client.send_lines("MGET a missing b", 3);
    assert_eq!(values, vec!["1", "(nil)", "2"]);

    assert_eq!(client.send("MDEL a b ghost"), "2");
    assert_eq!(client.send("GET a"), "-ERR key not found");

    assert_eq!(client.send("MSET odd args broken"), "-ERR MSET requires key value pairs");

    drop(client);
    server.stop();
}

#[test]
fn test_scan_over_wire() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path());
    let mut client = TestClient::connect(server.addr);

    assert_eq!(client.send("MSET k1 a k2 b k3 c"), "+OK");

    let lines = client.send_lines("SCAN 0 COUNT 10", 4);
    assert_eq!(lines[0], "0");
    assert_eq!(lines[1..], ["k1", "k2", "k3"]);

    // Paginate two at a time: first page returns a resume cursor.
    let first = client.send_lines("SCAN 0 COUNT 2", 3);
    assert_eq!(first[0], "2");
    assert_eq!(first[1..], ["k1", "k2"]);

    let second = client.send_lines("SCAN 2 COUNT 2", 2);
    assert_eq!(second[0], "0");
    assert_eq!(second[1], "k3");

    // Cursor beyond the end: bare zero cursor, no keys.
    assert_eq!(client.send("SCAN 99"), "0");

    drop(client);
    server.stop();
}

#[test]
fn test_clear_info_stats_health() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path());
    let mut client = TestClient::connect(server.addr);

    assert_eq!(client.send("MSET a 1 b 2"), "+OK");

    let info = client.send("INFO");
    assert!(
        info.starts_with("+OK keys=2 connections=1 wal_size="),
        "unexpected INFO: {info}"
    );

    let stats = client.send("STATS");
    assert!(stats.starts_with("+OK keys=2 wal_size="), "unexpected STATS: {stats}");
    assert!(stats.contains("wal_entries=2"));
    assert!(stats.contains("needs_compaction=false"));
    assert!(stats.contains("ttl_expired="));
    assert!(stats.contains("ttl_checks="));

    let health = client.send_lines("HEALTH", 7).join("\n");
    assert!(health.contains("\"status\": \"healthy\""));
    assert!(health.contains("\"keys\": 2"));
    assert!(health.contains("\"wal_healthy\": true"));

    assert_eq!(client.send("CLEAR"), "+OK");
    assert_eq!(client.send("GET a"), "-ERR key not found");

    drop(client);
    server.stop();
}

#[test]
fn test_sync_compact_config() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path());
    let mut client = TestClient::connect(server.addr);

    assert_eq!(client.send("SET a 1"), "+OK");
    assert_eq!(client.send("SYNC"), "+OK");
    assert_eq!(client.send("COMPACT"), "+OK");

    let stats = client.send("STATS");
    assert!(stats.contains("wal_entries=0"), "unexpected STATS: {stats}");

    assert_eq!(client.send("CONFIG GET host"), "127.0.0.1");
    assert_eq!(client.send("CONFIG GET max_connections"), "0");
    assert_eq!(client.send("CONFIG GET bogus"), "-ERR unknown config parameter");

    drop(client);
    server.stop();
}

#[test]
fn test_unknown_and_blank_commands() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path());
    let mut client = TestClient::connect(server.addr);

    assert_eq!(client.send("FROBNICATE now"), "-ERR unknown command 'FROBNICATE'");

    // Blank lines are skipped, not answered.
    client.stream.write_all(b"   \n").unwrap();
    assert_eq!(client.send("PING"), "+PONG");

    drop(client);
    server.stop();
}

// =============================================================================
// Connection Handling
// =============================================================================

#[test]
fn test_connection_limit() {
    let temp = TempDir::new().unwrap();
    let config = Config::builder()
        .host("127.0.0.1")
        .port(0)
        .data_dir(temp.path())
        .max_connections(1)
        .build();
    let server = TestServer::start_with(config);

    let mut first = TestClient::connect(server.addr);
    assert_eq!(first.send("PING"), "+PONG");

    // Second connection is rejected before the welcome banner.
    let stream = TcpStream::connect(server.addr).unwrap();
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert_eq!(line, "-ERR connection limit reached\n");

    drop(reader);
    drop(first);
    server.stop();
}

#[test]
fn test_concurrent_clients() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path());

    let mut handles = vec![];
    for i in 0..8 {
        let addr = server.addr;
        handles.push(thread::spawn(move || {
            let mut client = TestClient::connect(addr);
            for j in 0..25 {
                let key = format!("key-{i}-{j}");
                assert_eq!(client.send(&format!("SET {key} v{j}")), "+OK");
                assert_eq!(client.send(&format!("GET {key}")), format!("v{j}"));
            }
            assert_eq!(client.send("QUIT"), "+OK goodbye");
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let mut client = TestClient::connect(server.addr);
    let info = client.send("INFO");
    assert!(info.contains("keys=200"), "unexpected INFO: {info}");

    drop(client);
    server.stop();
}

#[test]
fn test_quit_closes_connection() {
    let temp = TempDir::new().unwrap();
    let server = TestServer::start(temp.path());
    let mut client = TestClient::connect(server.addr);

    assert_eq!(client.send("QUIT"), "+OK goodbye");

    // The server closes its side; the next read sees EOF.
    let mut line = String::new();
    let read = client.reader.read_line(&mut line).unwrap();
    assert_eq!(read, 0);

    drop(client);
    server.stop();
}
