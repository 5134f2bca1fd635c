//! Line framing for modem output
//!
//! Splits the byte stream on CR and LF and collapses redundant whitespace,
//! so the parser only ever sees simplified, non-empty lines.

use super::TransportError;
use crate::core::protocol::xlcs::simplify;
use bytes::BytesMut;
use tokio_util::codec::Decoder;

/// Longest line buffered before it is flushed without a terminator
const DEFAULT_MAX_LENGTH: usize = 4096;

/// Decoder producing whitespace-simplified lines
#[derive(Debug, Clone)]
pub struct ModemLineCodec {
    max_length: usize,
}

impl ModemLineCodec {
    /// Create a codec with the default line limit
    pub fn new() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
        }
    }

    /// Create a codec flushing unterminated data after `max_length` bytes
    pub fn with_max_length(max_length: usize) -> Self {
        Self { max_length }
    }
}

impl Default for ModemLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn take_line(src: &mut BytesMut, len: usize) -> String {
    let raw = src.split_to(len);
    simplify(&String::from_utf8_lossy(&raw))
}

impl Decoder for ModemLineCodec {
    type Item = String;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, TransportError> {
        loop {
            let Some(pos) = src.iter().position(|b| *b == b'\r' || *b == b'\n') else {
                if src.len() > self.max_length {
                    let line = take_line(src, src.len());
                    return Ok((!line.is_empty()).then_some(line));
                }
                return Ok(None);
            };

            let line = take_line(src, pos + 1);
            if !line.is_empty() {
                return Ok(Some(line));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, TransportError> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if src.is_empty() {
            return Ok(None);
        }
        let line = take_line(src, src.len());
        Ok((!line.is_empty()).then_some(line))
    }
}
