//! kvlite CLI Client
//!
//! Command-line interface for a running kvlite server. Uses a single
//! pooled connection per invocation: sequential write-then-read on one
//! stream, the same pattern as Redis clients.

use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};

use kvlite::client::{Pool, PoolOptions};
use kvlite::Result;

/// kvlite CLI
#[derive(Parser, Debug)]
#[command(name = "kvlite-cli")]
#[command(about = "CLI for the kvlite key-value store")]
#[command(version)]
struct Args {
    /// Server address (host:port)
    #[arg(short, long, default_value = "localhost:6380")]
    server: String,

    /// Connection timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get { key: String },

    /// Set a key-value pair
    Set { key: String, value: String },

    /// Set a key-value pair with a TTL in seconds
    Setex { key: String, seconds: u64, value: String },

    /// Delete a key
    Del { key: String },

    /// Increment an integer key
    Incr { key: String },

    /// Remaining TTL for a key
    Ttl { key: String },

    /// List keys matching a glob pattern
    Keys {
        #[arg(default_value = "*")]
        pattern: String,
    },

    /// Server info line
    Info,

    /// Server statistics
    Stats,

    /// Force a snapshot + WAL truncation
    Compact,

    /// Ping the server
    Ping,
}

fn main() -> ExitCode {
    let args = Args::parse();

    match run(&args) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<String> {
    let pool = Pool::new(PoolOptions {
        addr: args.server.clone(),
        max_idle: 1,
        max_active: 1,
        connect_timeout: Duration::from_millis(args.timeout),
    })?;

    let mut conn = pool.get()?;

    // KEYS answers with one line per key and no length up front, so it
    // drains the connection instead of reading a single line.
    if let Commands::Keys { pattern } = &args.command {
        let lines = conn.command_drain("KEYS", &[pattern])?;
        pool.close();
        return Ok(lines.join("\n"));
    }

    let response = match &args.command {
        Commands::Get { key } => conn.command("GET", &[key])?,
        Commands::Set { key, value } => conn.command("SET", &[key, value])?,
        Commands::Setex { key, seconds, value } => {
            let secs = seconds.to_string();
            conn.command("SETEX", &[key, &secs, value])?
        }
        Commands::Del { key } => conn.command("DELETE", &[key])?,
        Commands::Incr { key } => conn.command("INCR", &[key])?,
        Commands::Ttl { key } => conn.command("TTL", &[key])?,
        Commands::Keys { .. } => unreachable!("handled above"),
        Commands::Info => conn.command("INFO", &[])?,
        Commands::Stats => conn.command("STATS", &[])?,
        Commands::Compact => conn.command("COMPACT", &[])?,
        Commands::Ping => conn.command("PING", &[])?,
    };

    pool.put(conn);
    pool.close();

    if let Some(message) = response.strip_prefix("-ERR ") {
        return Err(kvlite::KvError::Protocol(message.to_string()));
    }

    Ok(response)
}
