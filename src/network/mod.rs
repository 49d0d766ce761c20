//! Network Module
//!
//! TCP server and per-connection session handling.
//!
//! ## Architecture
//! - Single acceptor thread polling a non-blocking listener
//! - One worker thread per accepted connection
//! - Commands dispatched to a shared Engine

mod connection;
mod server;

pub use connection::Connection;
pub use server::{Server, ServerHandle};
