//! Protocol Module
//!
//! The line-oriented text protocol spoken over TCP.
//!
//! ## Request Format
//! One command per line, whitespace-separated fields:
//! ```text
//! SET user:1 hello world\n
//! ```
//! The command word is case-insensitive. For SET/SETEX/APPEND the
//! value is everything after the fixed arguments, re-joined with
//! single spaces.
//!
//! ## Response Format
//! One logical response per command, newline-terminated. Responses
//! beginning with `+` are status lines (`+OK`, `+PONG`), `-ERR ...`
//! reports an error, and anything else is a payload (a value, an
//! integer, or newline-separated lines for KEYS/SCAN/MGET).

mod command;
mod response;

pub use command::Command;
pub use response::Response;
