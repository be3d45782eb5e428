// SPDX-License-Identifier: MIT OR Apache-2.0
//! Transport-level errors (spec.md §4.5, §7 `ProtocolError`).

use thiserror::Error;

/// Canonical JSON-RPC 2.0 error codes (spec.md §4.5).
pub mod codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Errors raised while framing, parsing, or exchanging JSON-RPC messages.
///
/// Per spec.md §7, every variant here is non-retryable at the transport
/// layer: a `ProtocolError` means the stdio stream is desynchronised and
/// the subprocess must be killed and removed from the pool.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A header line was not `key: value` shaped.
    #[error("invalid header: {0:?}")]
    InvalidHeader(String),

    /// No `Content-Length` header was present before the blank line.
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// The `Content-Length` value was not a valid non-negative integer.
    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    /// The stream closed before `Content-Length` bytes were available.
    #[error("incomplete message: expected {expected} bytes, got {actual}")]
    Incomplete {
        /// Bytes declared by `Content-Length`.
        expected: usize,
        /// Bytes actually read before EOF.
        actual: usize,
    },

    /// The body was not valid UTF-8 JSON.
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The body was valid JSON but not a request or response shape.
    #[error("message must have jsonrpc == \"2.0\"")]
    InvalidJsonrpcVersion,

    /// The underlying stream failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A `call` did not receive a response before its deadline.
    #[error("call to {method:?} timed out after {elapsed_ms}ms")]
    Timeout {
        /// The method that was called.
        method: String,
        /// Elapsed time before giving up.
        elapsed_ms: u64,
    },

    /// The reader task exited (e.g. the child process closed stdout).
    #[error("transport closed")]
    Closed,
}
