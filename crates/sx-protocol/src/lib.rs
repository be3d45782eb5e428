// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! Content-Length-framed JSON-RPC 2.0 transport for talking to a
//! subprocess runner over stdio (spec.md §4.5).

/// Background-reader `RpcClient` multiplexing concurrent calls by id.
pub mod client;
/// Frame encoding/decoding over a byte stream.
pub mod codec;
/// Request/Response/Message wire shapes.
pub mod envelope;
/// Transport error taxonomy and canonical JSON-RPC error codes.
pub mod error;

pub use client::RpcClient;
pub use codec::{encode, FrameParser};
pub use envelope::{Message, Request, Response, RpcErrorObject};
pub use error::ProtocolError;
