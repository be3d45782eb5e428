// SPDX-License-Identifier: MIT OR Apache-2.0
//! `RpcClient` — the parent-side half of the stdio JSON-RPC transport
//! (spec.md §4.5).
//!
//! A background reader task owns the child's stdout, decodes frames, and
//! dispatches each [`Response`] to the `oneshot` channel registered for its
//! `id`. `call` is safe to invoke concurrently from multiple tasks; nothing
//! here enforces "one caller at a time" for a given child process — that
//! serialisation is the Warm Process Pool's job (spec.md §4.7), not the
//! transport's.

use crate::codec::{self, FrameParser};
use crate::envelope::{Message, Request, Response};
use crate::error::ProtocolError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tracing::{trace, warn};

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<Response>>>>;

/// A JSON-RPC client bound to one child process's stdin/stdout pair.
pub struct RpcClient {
    stdin: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: PendingMap,
    next_id: AtomicI64,
    reader_done: oneshot::Receiver<()>,
}

impl RpcClient {
    /// Bind a client to a child's stdio streams, spawning the background
    /// reader task.
    pub fn new<R, W>(stdout: R, stdin: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (done_tx, done_rx) = oneshot::channel();
        spawn_reader(stdout, pending.clone(), done_tx);

        Self {
            stdin: Mutex::new(Box::new(stdin)),
            pending,
            next_id: AtomicI64::new(1),
            reader_done: done_rx,
        }
    }

    /// Issue a request and wait (up to `timeout`) for its response.
    ///
    /// On timeout, the call returns [`ProtocolError::Timeout`] but the
    /// pending-response slot is left registered — a late response is
    /// simply dropped when it arrives, since the caller has moved on. The
    /// Warm Process Pool treats a timed-out process as poisoned regardless
    /// (spec.md §5).
    pub async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, ProtocolError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending-map lock poisoned")
            .insert(id, tx);

        let request = Message::Request(Request::new(id, method, params));
        let framed = codec::encode(&request)?;

        {
            let mut stdin = self.stdin.lock().expect("stdin lock poisoned");
            stdin.write_all(&framed).await?;
            stdin.flush().await?;
        }

        let started = std::time::Instant::now();
        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                self.pending.lock().expect("pending-map lock poisoned").remove(&id);
                return Err(ProtocolError::Closed);
            }
            Err(_) => {
                return Err(ProtocolError::Timeout {
                    method: method.to_string(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
        };

        if let Some(err) = response.error {
            return Err(ProtocolError::InvalidJson(serde_json::Error::io(
                std::io::Error::other(format!(
                    "rpc error {}: {}",
                    err.code, err.message
                )),
            )));
        }

        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }

    /// Send a request without waiting for a response (used for `shutdown`,
    /// where the child may exit before replying).
    pub async fn notify(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<(), ProtocolError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = Message::Request(Request::new(id, method, params));
        let framed = codec::encode(&request)?;
        let mut stdin = self.stdin.lock().expect("stdin lock poisoned");
        stdin.write_all(&framed).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// `true` once the background reader task has exited (EOF or a
    /// framing error) — a signal that the process should be considered
    /// poisoned.
    pub fn is_closed(&mut self) -> bool {
        matches!(self.reader_done.try_recv(), Ok(()) | Err(oneshot::error::TryRecvError::Closed))
    }
}

fn spawn_reader<R>(mut stdout: R, pending: PendingMap, done: oneshot::Sender<()>)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut parser = FrameParser::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = match stdout.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!(target: "sx.protocol", error = %e, "stdout read failed");
                    break;
                }
            };

            for result in parser.push(&buf[..n]) {
                match result {
                    Ok(Message::Response(response)) => {
                        if let Some(id) = response.id {
                            let sender = pending.lock().expect("pending-map lock poisoned").remove(&id);
                            if let Some(sender) = sender {
                                let _ = sender.send(response);
                            } else {
                                trace!(target: "sx.protocol", id, "response for unknown/expired id");
                            }
                        }
                    }
                    Ok(Message::Request(req)) => {
                        trace!(target: "sx.protocol", method = %req.method, "dropping unsolicited request on response channel");
                    }
                    Err(e) => {
                        warn!(target: "sx.protocol", error = %e, "framing error, closing reader");
                        break;
                    }
                }
            }
        }
        let _ = done.send(());
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Response;
    use serde_json::json;
    use tokio::io::duplex;

    #[tokio::test]
    async fn call_round_trips_through_a_duplex_pipe() {
        let (client_side, mut server_side) = duplex(4096);
        let (server_read, client_write) = tokio::io::split(client_side);

        let client = RpcClient::new(server_read, client_write);

        let responder = tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            let n = server_side.read(&mut buf).await.unwrap();
            let mut parser = FrameParser::new();
            let msgs = parser.push(&buf[..n]);
            let Message::Request(req) = msgs[0].as_ref().unwrap().clone() else {
                panic!("expected request");
            };
            let response = Message::Response(Response::ok(req.id, json!({"ready": true})));
            let framed = codec::encode(&response).unwrap();
            server_side.write_all(&framed).await.unwrap();
        });

        let result = client
            .call("ready", json!({}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result, json!({"ready": true}));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn call_times_out_when_no_response_arrives() {
        let (client_side, _server_side) = duplex(4096);
        let (server_read, client_write) = tokio::io::split(client_side);
        let client = RpcClient::new(server_read, client_write);

        let result = client
            .call("ready", json!({}), Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(ProtocolError::Timeout { .. })));
    }
}
