//! Minimal HTTP/1.1 framing for the IPC socket.
//!
//! Both ends are this crate, so only the subset actually spoken is
//! implemented: `POST <route> HTTP/1.1` with a `content-length` body, one
//! request and one reply per connection. Content types are not negotiated;
//! bodies are always JSON.

use anyhow::{Context, Result, bail};

/// Upper bound on body size; a length claim beyond this is a protocol error.
const MAX_BODY: usize = 16 * 1024 * 1024;

/// A parsed request: route plus body. Only `POST` is ever spoken, so the
/// method is validated during parsing rather than carried around.
#[derive(Debug)]
pub struct Request {
    pub path: String,
    pub body: Vec<u8>,
}

// ============================================================================
// Async side (server)
// ============================================================================

pub mod aio {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt};

    /// Read one request from the stream.
    pub async fn request<R>(reader: &mut R) -> Result<Request>
    where
        R: AsyncBufReadExt + Unpin,
    {
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .context("failed to read request line")?;
        let path = super::parse_request_line(&line)?;

        let mut content_length = 0usize;
        loop {
            let mut header = String::new();
            let n = reader
                .read_line(&mut header)
                .await
                .context("failed to read header line")?;
            if n == 0 || header.trim().is_empty() {
                break;
            }
            if let Some(len) = super::parse_content_length(&header)? {
                content_length = len;
            }
        }

        let mut body = vec![0u8; content_length];
        reader
            .read_exact(&mut body)
            .await
            .context("failed to read request body")?;
        Ok(Request { path, body })
    }

    /// Write one reply to the stream.
    pub async fn response<W>(writer: &mut W, status: u16, body: &[u8]) -> Result<()>
    where
        W: AsyncWriteExt + Unpin,
    {
        let head = super::response_head(status, body.len());
        writer
            .write_all(head.as_bytes())
            .await
            .context("failed to write response head")?;
        writer
            .write_all(body)
            .await
            .context("failed to write response body")?;
        writer.flush().await.context("failed to flush response")?;
        Ok(())
    }
}

// ============================================================================
// Blocking side (client)
// ============================================================================

pub mod blocking {
    use super::*;
    use std::io::{BufRead, Read, Write};

    /// Write one request to the stream.
    pub fn write_request<W: Write>(writer: &mut W, path: &str, body: &[u8]) -> Result<()> {
        write!(
            writer,
            "POST {path} HTTP/1.1\r\nconnection: close\r\ncontent-length: {}\r\n\r\n",
            body.len()
        )
        .context("failed to write request head")?;
        writer.write_all(body).context("failed to write request body")?;
        writer.flush().context("failed to flush request")?;
        Ok(())
    }

    /// Read one reply; returns the status code and body.
    pub fn read_response<R: BufRead>(reader: &mut R) -> Result<(u16, Vec<u8>)> {
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .context("failed to read status line")?;
        let status = super::parse_status_line(&line)?;

        let mut content_length = 0usize;
        loop {
            let mut header = String::new();
            let n = reader
                .read_line(&mut header)
                .context("failed to read header line")?;
            if n == 0 || header.trim().is_empty() {
                break;
            }
            if let Some(len) = super::parse_content_length(&header)? {
                content_length = len;
            }
        }

        let mut body = vec![0u8; content_length];
        reader
            .read_exact(&mut body)
            .context("failed to read response body")?;
        Ok((status, body))
    }
}

// ============================================================================
// Shared parsing
// ============================================================================

fn parse_request_line(line: &str) -> Result<String> {
    let mut parts = line.trim_end().split(' ');
    match (parts.next(), parts.next()) {
        (Some("POST"), Some(path)) if !path.is_empty() => Ok(path.to_string()),
        _ => bail!("malformed request line: {line:?}"),
    }
}

fn parse_status_line(line: &str) -> Result<u16> {
    // "HTTP/1.1 200 OK"
    line.trim_end()
        .split(' ')
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| anyhow::anyhow!("malformed status line: {line:?}"))
}

fn parse_content_length(header: &str) -> Result<Option<usize>> {
    let Some((name, value)) = header.split_once(':') else {
        return Ok(None);
    };
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return Ok(None);
    }
    let len: usize = value
        .trim()
        .parse()
        .with_context(|| format!("bad content-length: {header:?}"))?;
    if len > MAX_BODY {
        bail!("body too large: {len} bytes");
    }
    Ok(Some(len))
}

fn response_head(status: u16, body_len: usize) -> String {
    let reason = if status == 200 { "OK" } else { "Error" };
    format!(
        "HTTP/1.1 {status} {reason}\r\nconnection: close\r\ncontent-length: {body_len}\r\n\r\n"
    )
}

// ============================================================================
// Tests
// ============================================================================
