//! Request decoding

use super::{ProtocolError, Request, MAX_ARGS, MAX_BULK_LEN, MAX_LINE_LEN};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Read one request from the stream.
///
/// Returns `Ok(None)` on a clean end of stream between requests. An empty
/// inline line decodes to an empty request.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<Request>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let Some(line) = read_line(reader).await? else {
        return Ok(None);
    };

    match line.first() {
        Some(b'*') => {
            let count = parse_length(&line[1..], "multibulk length")?;
            if count > MAX_ARGS {
                return Err(malformed(format!("too many arguments: {}", count)));
            }
            let mut args = Vec::with_capacity(count);
            for _ in 0..count {
                args.push(read_bulk(reader).await?);
            }
            Ok(Some(args))
        }
        _ => Ok(Some(
            line.split(|b| b.is_ascii_whitespace())
                .filter(|word| !word.is_empty())
                .map(<[u8]>::to_vec)
                .collect(),
        )),
    }
}

/// Read one `$<len>\r\n<bytes>\r\n` bulk string
async fn read_bulk<R>(reader: &mut R) -> Result<Vec<u8>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(reader)
        .await?
        .ok_or_else(|| malformed("unexpected end of stream"))?;
    if line.first() != Some(&b'$') {
        return Err(malformed(format!(
            "expected '$', got {:?}",
            String::from_utf8_lossy(&line)
        )));
    }
    let len = parse_length(&line[1..], "bulk length")?;
    if len > MAX_BULK_LEN {
        return Err(malformed(format!("bulk string too large: {} bytes", len)));
    }

    let mut data = vec![0u8; len + 2];
    reader.read_exact(&mut data).await?;
    if !data.ends_with(b"\r\n") {
        return Err(malformed("bulk string not terminated by CRLF"));
    }
    data.truncate(len);
    Ok(data)
}

/// Read a line without its terminator. `None` at end of stream.
async fn read_line<R>(reader: &mut R) -> Result<Option<Vec<u8>>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let mut limited = (&mut *reader).take(MAX_LINE_LEN as u64 + 2);
    let n = limited.read_until(b'\n', &mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') {
        return Err(if line.len() >= MAX_LINE_LEN {
            malformed("line too long")
        } else {
            malformed("unexpected end of stream")
        });
    }
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(line))
}

fn parse_length(digits: &[u8], what: &str) -> Result<usize, ProtocolError> {
    std::str::from_utf8(digits)
        .ok()
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            malformed(format!(
                "invalid {}: {:?}",
                what,
                String::from_utf8_lossy(digits)
            ))
        })
}

fn malformed(msg: impl Into<String>) -> ProtocolError {
    ProtocolError::Malformed(msg.into())
}
