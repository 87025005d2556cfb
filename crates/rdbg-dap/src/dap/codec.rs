//! `Content-Length` framing for DAP messages over any tokio byte stream.
//!
//! ```text
//! Content-Length: 123\r\n
//! \r\n
//! { ...json... }
//! ```

use std::io;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use super::{MAX_DAP_HEADER_LINE_BYTES, MAX_DAP_MESSAGE_BYTES};

#[derive(Debug, Error)]
pub enum DapError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A well-framed body that does not decode. The stream is still in sync.
    #[error("json error: {0}")]
    Json(String),

    #[error("dap protocol error: {0}")]
    Protocol(String),
}

pub type Result<T> = std::result::Result<T, DapError>;

/// `serde_json` messages can echo scalar values from the payload, e.g.
/// `invalid type: string "...", expected u64`; trace logs carry program
/// values, so those are replaced before the message is surfaced.
pub fn sanitize_json_error_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(start) = rest.find('"') {
        out.push_str(&rest[..start + 1]);
        rest = &rest[start + 1..];

        let Some(end) = rest.find('"') else {
            out.push_str(rest);
            return out;
        };
        out.push_str("<redacted>\"");
        rest = &rest[end + 1..];
    }
    out.push_str(rest);

    // `unknown field `secret`, expected ...`: only the first backticked
    // segment is user-controlled.
    if let Some(start) = out.find('`') {
        if let Some(end_rel) = out[start + 1..].find('`') {
            let end = start + 1 + end_rel;
            out.replace_range(start + 1..end, "<redacted>");
        }
    }

    out
}

pub struct DapReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> DapReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
        }
    }

    async fn read_line_limited(&mut self, max_len: usize) -> Result<Option<String>> {
        let mut buf = Vec::<u8>::new();
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if buf.is_empty() {
                    return Ok(None);
                }
                break;
            }

            let newline_pos = available.iter().position(|&b| b == b'\n');
            let take = newline_pos.map(|pos| pos + 1).unwrap_or(available.len());
            if buf.len() + take > max_len {
                return Err(DapError::Protocol(format!(
                    "DAP header line exceeds maximum size ({max_len} bytes)"
                )));
            }

            buf.extend_from_slice(&available[..take]);
            self.reader.consume(take);
            if newline_pos.is_some() {
                break;
            }
        }

        String::from_utf8(buf)
            .map(Some)
            .map_err(|_| DapError::Protocol("DAP header line is not UTF-8".to_string()))
    }

    /// Read one message body. `Ok(None)` is a clean end of stream.
    pub async fn read_raw(&mut self) -> Result<Option<Vec<u8>>> {
        let mut content_length: Option<usize> = None;
        let mut saw_header_line = false;

        loop {
            let Some(line) = self.read_line_limited(MAX_DAP_HEADER_LINE_BYTES).await? else {
                if !saw_header_line {
                    return Ok(None);
                }
                return Err(DapError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "EOF while reading DAP headers",
                )));
            };
            saw_header_line = true;

            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break;
            }

            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if name.eq_ignore_ascii_case("Content-Length") {
                let value = value.trim();
                content_length = Some(value.parse::<usize>().map_err(|err| {
                    DapError::Protocol(format!("invalid Content-Length {value:?}: {err}"))
                })?);
            }
        }

        let Some(len) = content_length else {
            return Err(DapError::Protocol(
                "missing Content-Length header".to_string(),
            ));
        };
        if len > MAX_DAP_MESSAGE_BYTES {
            return Err(DapError::Protocol(format!(
                "DAP message Content-Length {len} exceeds maximum allowed size {MAX_DAP_MESSAGE_BYTES}"
            )));
        }

        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).await?;
        Ok(Some(buf))
    }

    pub async fn read_message<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        let Some(bytes) = self.read_raw().await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| DapError::Json(sanitize_json_error_message(&err.to_string())))
    }
}

pub struct DapWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> DapWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_raw(&mut self, json_bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(format!("Content-Length: {}\r\n\r\n", json_bytes.len()).as_bytes())
            .await?;
        self.writer.write_all(json_bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let bytes = serde_json::to_vec(message)
            .map_err(|err| DapError::Json(sanitize_json_error_message(&err.to_string())))?;
        self.write_raw(&bytes).await
    }
}
