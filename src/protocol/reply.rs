//! Reply encoding

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// A reply to one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+<text>\r\n`
    Status(String),
    /// `$<len>\r\n<bytes>\r\n`
    Bulk(Vec<u8>),
    /// `*<n>\r\n` followed by n bulk strings
    Array(Vec<Vec<u8>>),
    /// `-<text>\r\n`
    Error(String),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    /// Error reply in the conventional `ERR <message>` form
    pub fn err(message: impl std::fmt::Display) -> Self {
        Reply::Error(format!("ERR {}", message))
    }

    /// Encode to wire bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Reply::Status(text) => push_line(&mut out, b'+', text),
            Reply::Error(text) => push_line(&mut out, b'-', text),
            Reply::Bulk(data) => push_bulk(&mut out, data),
            Reply::Array(items) => {
                out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    push_bulk(&mut out, item);
                }
            }
        }
        out
    }
}

/// Simple strings cannot carry line breaks
fn push_line(out: &mut Vec<u8>, prefix: u8, text: &str) {
    out.push(prefix);
    out.extend(text.bytes().map(|b| if b == b'\r' || b == b'\n' { b' ' } else { b }));
    out.extend_from_slice(b"\r\n");
}

fn push_bulk(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(format!("${}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

/// Write a reply and flush it
pub async fn write_reply<W>(writer: &mut W, reply: &Reply) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&reply.encode()).await?;
    writer.flush().await
}
