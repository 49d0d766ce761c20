//! kvlite Server Binary
//!
//! Opens the engine on the data directory and serves the TCP protocol.

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use kvlite::network::Server;
use kvlite::{Config, Engine};

/// kvlite server
#[derive(Parser, Debug)]
#[command(name = "kvlite-server")]
#[command(about = "Durable in-memory key-value store")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (0 = OS-assigned)
    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(short, long)]
    max_connections: Option<usize>,

    /// Data directory for WAL and snapshot files
    #[arg(short, long, default_value = "./data")]
    data_dir: String,

    /// fsync the WAL after every write (slower but safer)
    #[arg(long)]
    sync_mode: bool,

    /// Trigger compaction after this many WAL entries
    #[arg(long, default_value = "10000")]
    max_wal_entries: u64,

    /// Trigger compaction after the WAL reaches this size (bytes)
    #[arg(long, default_value = "10485760")]
    max_wal_size: u64,

    /// Seconds between background compaction checks
    #[arg(long, default_value = "60")]
    compact_interval: u64,

    /// Seconds between background TTL sweeps
    #[arg(long, default_value = "1")]
    ttl_check_interval: u64,
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kvlite=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    // Environment first, flags override.
    let mut config = Config::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(max) = args.max_connections {
        config.max_connections = max;
    }
    config.data_dir = args.data_dir.into();
    config.sync_mode = args.sync_mode;
    config.max_wal_entries = args.max_wal_entries;
    config.max_wal_size = args.max_wal_size;
    config.compaction_interval = Duration::from_secs(args.compact_interval);
    config.ttl_check_interval = Duration::from_secs(args.ttl_check_interval);

    tracing::info!("kvlite v{}", kvlite::VERSION);
    tracing::info!("data directory: {}", config.data_dir.display());
    tracing::info!("bind address: {}", config.address());

    let engine = match Engine::open(config.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("failed to open engine: {e}");
            std::process::exit(1);
        }
    };

    let mut server = match Server::bind(config, engine.clone()) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("failed to start server: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("server error: {e}");
        std::process::exit(1);
    }

    if let Err(e) = engine.close() {
        tracing::error!("failed to close engine: {e}");
        std::process::exit(1);
    }

    tracing::info!("server stopped");
}
