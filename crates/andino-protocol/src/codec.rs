//! Newline framing for the command link.
//!
//! `LineCodec` turns a byte stream into text lines and back:
//!
//! ```text
//! bytes ──▶ split at '\n' ──▶ strip trailing '\r' ──▶ decode(encoding) ──▶ String
//! String ──▶ encode(encoding) ──▶ append '\n' ──▶ bytes
//! ```
//!
//! Lines longer than the configured maximum are rejected so a peer that never
//! sends a terminator cannot grow the buffer without bound.
//!
//! # Usage with Tokio Framed
//!
//! ```rust,no_run
//! use andino_protocol::LineCodec;
//! use futures::{SinkExt, StreamExt};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//!
//! # async fn example() -> Result<(), andino_protocol::ProtocolError> {
//! let stream = TcpStream::connect("127.0.0.1:9999").await?;
//! let mut framed = Framed::new(stream, LineCodec::new());
//!
//! framed.send("INFO".to_string()).await?;
//! if let Some(Ok(reply)) = framed.next().await {
//!     println!("{reply}");
//! }
//! # Ok(())
//! # }
//! ```

use andino_core::TextEncoding;
use andino_core::constants::MAX_LINE_LENGTH;
use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::{ProtocolError, Result};

/// Tokio codec for newline-delimited text.
#[derive(Debug, Clone)]
pub struct LineCodec {
    encoding: TextEncoding,
    max_length: usize,
    /// Bytes already scanned for a terminator.
    next_index: usize,
}

impl LineCodec {
    /// UTF-8 lines up to [`MAX_LINE_LENGTH`] bytes.
    pub fn new() -> Self {
        Self::with_encoding(TextEncoding::Utf8)
    }

    pub fn with_encoding(encoding: TextEncoding) -> Self {
        Self {
            encoding,
            max_length: MAX_LINE_LENGTH,
            next_index: 0,
        }
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    fn take_line(&mut self, src: &mut BytesMut, len: usize, consume: usize) -> String {
        let raw = src.split_to(consume);
        self.next_index = 0;
        let mut line = &raw[..len];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        self.encoding.decode(line)
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        let start = self.next_index.min(src.len());
        match src[start..].iter().position(|&b| b == b'\n') {
            Some(offset) => {
                let len = start + offset;
                if len > self.max_length {
                    return Err(ProtocolError::LineTooLong {
                        limit: self.max_length,
                    });
                }
                Ok(Some(self.take_line(src, len, len + 1)))
            }
            None => {
                if src.len() > self.max_length {
                    return Err(ProtocolError::LineTooLong {
                        limit: self.max_length,
                    });
                }
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let len = src.len();
        Ok(Some(self.take_line(src, len, len)))
    }
}

impl Encoder<String> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        let bytes = self.encoding.encode(&item)?;
        dst.reserve(bytes.len() + 1);
        dst.put_slice(&bytes);
        dst.put_u8(b'\n');
        Ok(())
    }
}

impl Encoder<&str> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &str, dst: &mut BytesMut) -> Result<()> {
        let bytes = self.encoding.encode(item)?;
        dst.reserve(bytes.len() + 1);
        dst.put_slice(&bytes);
        dst.put_u8(b'\n');
        Ok(())
    }
}
