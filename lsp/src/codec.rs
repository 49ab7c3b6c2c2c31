//! `Content-Length` framing for JSON-RPC over byte streams.
//!
//! Each message is `Content-Length: N\r\n\r\n` followed by exactly `N` bytes
//! of UTF-8 JSON. Other headers (e.g. `Content-Type`) are accepted and
//! ignored.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Maximum frame size (4 MiB) to prevent unbounded memory allocation.
const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

const CONTENT_LENGTH: &str = "Content-Length";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("i/o error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("stream ended inside a frame header")]
    TruncatedHeader,
    #[error("frame header has no Content-Length")]
    MissingContentLength,
    #[error("invalid Content-Length value: {0:?}")]
    InvalidContentLength(String),
    #[error("Content-Length {0} exceeds maximum {MAX_FRAME_BYTES}")]
    FrameTooLarge(usize),
    #[error("frame body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn io(context: &'static str) -> impl FnOnce(std::io::Error) -> CodecError {
    move |source| CodecError::Io { context, source }
}

/// Extract the length from one header line, if it is a `Content-Length`
/// header. The header name is matched case-insensitively.
fn parse_header_line(line: &str) -> Result<Option<usize>, CodecError> {
    let Some((name, value)) = line.split_once(':') else {
        return Ok(None);
    };
    if !name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
        return Ok(None);
    }
    let value = value.trim();
    value
        .parse()
        .map(Some)
        .map_err(|_| CodecError::InvalidContentLength(value.to_string()))
}

/// Reads framed JSON-RPC messages.
pub struct FrameReader<R> {
    reader: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: String::new(),
        }
    }

    /// Read the next message. `Ok(None)` means clean EOF between frames.
    pub async fn read_frame(&mut self) -> Result<Option<serde_json::Value>, CodecError> {
        let Some(length) = self.read_content_length().await? else {
            return Ok(None);
        };
        if length > MAX_FRAME_BYTES {
            return Err(CodecError::FrameTooLarge(length));
        }

        let mut body = vec![0u8; length];
        self.reader
            .read_exact(&mut body)
            .await
            .map_err(io("reading frame body"))?;
        Ok(Some(serde_json::from_slice(&body)?))
    }

    async fn read_content_length(&mut self) -> Result<Option<usize>, CodecError> {
        let mut length = None;
        let mut in_header = false;

        loop {
            self.line.clear();
            let read = self
                .reader
                .read_line(&mut self.line)
                .await
                .map_err(io("reading frame header"))?;
            if read == 0 {
                // EOF is only clean before the first header byte of a frame.
                return if in_header {
                    Err(CodecError::TruncatedHeader)
                } else {
                    Ok(None)
                };
            }
            in_header = true;

            let line = self.line.trim();
            if line.is_empty() {
                break;
            }
            if let Some(parsed) = parse_header_line(line)? {
                length = Some(parsed);
            }
        }

        length.map(Some).ok_or(CodecError::MissingContentLength)
    }
}

/// Writes framed JSON-RPC messages.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one message and flush.
    pub async fn write_frame(&mut self, message: &serde_json::Value) -> Result<(), CodecError> {
        let body = serde_json::to_vec(message)?;
        let header = format!("{CONTENT_LENGTH}: {}\r\n\r\n", body.len());

        self.writer
            .write_all(header.as_bytes())
            .await
            .map_err(io("writing frame header"))?;
        self.writer
            .write_all(&body)
            .await
            .map_err(io("writing frame body"))?;
        self.writer.flush().await.map_err(io("flushing frame"))
    }
}
