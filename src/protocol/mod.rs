//! RESP wire protocol
//!
//! Requests are arrays of bulk strings:
//! `*<n>\r\n` then n times `$<len>\r\n<bytes>\r\n`.
//! Inline requests (one line of space-separated words) are accepted too, so
//! the server can be poked with telnet or `nc`.
//!
//! Replies are simple strings, errors, bulk strings or arrays of bulk
//! strings.

mod parse;
mod reply;

pub use parse::read_request;
pub use reply::{write_reply, Reply};

use std::io;
use thiserror::Error;

/// Most arguments accepted in a single request
pub const MAX_ARGS: usize = 1024 * 1024;

/// Largest bulk string accepted (512 MiB, as Redis)
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Longest header or inline line accepted
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Malformed(String),
}

/// One decoded request: command name followed by its arguments
pub type Request = Vec<Vec<u8>>;
