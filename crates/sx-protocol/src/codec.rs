// SPDX-License-Identifier: MIT OR Apache-2.0
//! Content-Length framing (spec.md §4.5): encode a [`Message`] to bytes,
//! and incrementally decode a byte stream back into messages.

use crate::envelope::Message;
use crate::error::ProtocolError;

/// Encode one message as a `Content-Length`-framed byte buffer.
pub fn encode(message: &Message) -> Result<Vec<u8>, ProtocolError> {
    let body = serde_json::to_vec(message)?;
    let mut framed = Vec::with_capacity(body.len() + 32);
    framed.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    framed.extend_from_slice(&body);
    Ok(framed)
}

/// Incremental Content-Length frame decoder.
///
/// Feed arbitrary byte chunks via [`push`](Self::push); complete messages
/// are returned as soon as their header and declared body length are
/// fully buffered. Handles headers or bodies split arbitrarily across
/// `push` calls, since stream reads may return short (spec.md §4.5).
///
/// A framing error (bad header, missing/invalid `Content-Length`) is
/// unrecoverable: the stream is desynchronised and the caller should treat
/// the underlying connection as poisoned (spec.md §7).
#[derive(Debug, Default)]
pub struct FrameParser {
    buf: Vec<u8>,
    poisoned: bool,
}

impl FrameParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning zero or more parsed messages (or a
    /// single terminal framing error, after which the parser stops
    /// producing output).
    pub fn push(&mut self, data: &[u8]) -> Vec<Result<Message, ProtocolError>> {
        if self.poisoned {
            return Vec::new();
        }
        self.buf.extend_from_slice(data);
        let mut out = Vec::new();
        loop {
            match self.try_parse_one() {
                Ok(Some(msg)) => out.push(Ok(msg)),
                Ok(None) => break,
                Err(e) => {
                    self.poisoned = true;
                    out.push(Err(e));
                    break;
                }
            }
        }
        out
    }

    /// Number of bytes buffered but not yet forming a complete message.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    fn try_parse_one(&mut self) -> Result<Option<Message>, ProtocolError> {
        let Some(header_end) = find_subslice(&self.buf, b"\r\n\r\n") else {
            return Ok(None);
        };

        let content_length = parse_content_length(&self.buf[..header_end])?;
        let body_start = header_end + 4;
        let body_end = body_start + content_length;

        if self.buf.len() < body_end {
            // Wait for more data; do not consume anything yet.
            return Ok(None);
        }

        let body = self.buf[body_start..body_end].to_vec();
        self.buf.drain(..body_end);

        let message: Message = serde_json::from_slice(&body)?;
        validate_jsonrpc_version(&message)?;
        Ok(Some(message))
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_content_length(header_block: &[u8]) -> Result<usize, ProtocolError> {
    let text = std::str::from_utf8(header_block)
        .map_err(|_| ProtocolError::InvalidHeader("non-UTF-8 header bytes".to_string()))?;

    let mut content_length = None;
    for line in text.split("\r\n").filter(|l| !l.is_empty()) {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| ProtocolError::InvalidHeader(line.to_string()))?;
        if key.trim().eq_ignore_ascii_case("content-length") {
            let value = value.trim();
            content_length = Some(
                value
                    .parse::<usize>()
                    .map_err(|_| ProtocolError::InvalidContentLength(value.to_string()))?,
            );
        }
    }

    content_length.ok_or(ProtocolError::MissingContentLength)
}

fn validate_jsonrpc_version(message: &Message) -> Result<(), ProtocolError> {
    let version = match message {
        Message::Request(r) => &r.jsonrpc,
        Message::Response(r) => &r.jsonrpc,
    };
    if version != "2.0" {
        return Err(ProtocolError::InvalidJsonrpcVersion);
    }
    Ok(())
}
