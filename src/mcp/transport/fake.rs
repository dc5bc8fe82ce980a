//! In-process fake transport for unit and integration tests
//!
//! This module provides [`FakeTransport`] and [`FakeTransportHandle`], an
//! in-process pair that replaces real network or process I/O in tests.
//!
//! # Usage
//!
//! Call [`FakeTransport::new`] to obtain a `(FakeTransport,
//! FakeTransportHandle)` pair. Wire the [`FakeTransport`] into the code
//! under test. From the test side, use the [`FakeTransportHandle`] to:
//!
//! - Read what the client sent: `handle.outbound_rx.recv().await`
//! - Inject server responses: `handle.inbound_tx.send(json_string)`
//!
//! Readiness fires as soon as [`Transport::run`] starts. Dropping the
//! handle's `inbound_tx` ends the current run cleanly, which lets tests
//! exercise the owner's reconnect path.
//!
//! ```text
//! client send() -----> outbound_tx -----> outbound_rx (handle reads)
//! handle inbound_tx -> inject queue ----> inbound_tx  (client receives)
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{OneMcpError, Result};
use crate::mcp::transport::Transport;

/// In-process fake transport for use in tests.
///
/// Implements the full [`Transport`] trait using in-memory channels, so
/// tests can drive an `UpstreamClient` without spawning real processes or
/// making network requests.
#[derive(Debug)]
pub struct FakeTransport {
    /// Sender side for `send()`; the handle drains it via `outbound_rx`.
    outbound_tx: mpsc::UnboundedSender<String>,
    /// Queue of injected server messages, pumped to the run's inbound
    /// channel.
    inject_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    /// Sender used by [`FakeTransport::inject_response`].
    inject_tx: mpsc::UnboundedSender<String>,
}

/// The test-side handle for a [`FakeTransport`].
#[derive(Debug)]
pub struct FakeTransportHandle {
    /// Receives messages the client under test sent via [`Transport::send`].
    pub outbound_rx: mpsc::UnboundedReceiver<String>,
    /// Sends server responses into the client's inbound stream. Dropping
    /// it ends the current run cleanly.
    pub inbound_tx: mpsc::UnboundedSender<String>,
}

impl FakeTransport {
    /// Create a new `(FakeTransport, FakeTransportHandle)` pair.
    pub fn new() -> (Self, FakeTransportHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inject_tx, inject_rx) = mpsc::unbounded_channel::<String>();

        let transport = Self {
            outbound_tx,
            inject_rx: Arc::new(Mutex::new(inject_rx)),
            inject_tx: inject_tx.clone(),
        };

        let handle = FakeTransportHandle {
            outbound_rx,
            inbound_tx: inject_tx,
        };

        (transport, handle)
    }

    /// Inject a [`serde_json::Value`] as a server message.
    ///
    /// # Panics
    ///
    /// Panics if the inject queue has been closed.
    pub fn inject_response(&self, response: serde_json::Value) {
        let serialized =
            serde_json::to_string(&response).expect("FakeTransport: failed to serialize response");
        self.inject_tx
            .send(serialized)
            .expect("FakeTransport: inject queue closed before inject_response");
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    /// Signal readiness immediately, then pump injected messages until
    /// cancellation or until every inject sender is dropped (clean end).
    async fn run(
        &self,
        cancel: CancellationToken,
        inbound_tx: mpsc::UnboundedSender<String>,
        ready_tx: mpsc::UnboundedSender<()>,
    ) -> Result<()> {
        let _ = ready_tx.send(());

        let rx = Arc::clone(&self.inject_rx);
        let mut guard = rx.lock().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                msg = guard.recv() => match msg {
                    Some(m) => {
                        let _ = inbound_tx.send(m);
                    }
                    None => return Ok(()),
                }
            }
        }
    }

    /// Record the outbound message so the test can read it via
    /// [`FakeTransportHandle::outbound_rx`].
    async fn send(&self, message: String) -> Result<()> {
        self.outbound_tx.send(message).map_err(|e| {
            anyhow::anyhow!(OneMcpError::Transport(format!(
                "FakeTransport outbound channel closed: {e}"
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// `send()` delivers the message to `handle.outbound_rx`.
    #[tokio::test]
    async fn test_send_delivers_to_handle() {
        let (transport, mut handle) = FakeTransport::new();

        transport
            .send(r#"{"jsonrpc":"2.0","method":"ping"}"#.to_string())
            .await
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), handle.outbound_rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        assert_eq!(received, r#"{"jsonrpc":"2.0","method":"ping"}"#);
    }

    /// A run pumps injected messages to the inbound channel and fires
    /// ready first.
    #[tokio::test]
    async fn test_run_pumps_injected_messages() {
        let (transport, handle) = FakeTransport::new();
        let transport = Arc::new(transport);

        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        let (ready_tx, mut ready_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let t = Arc::clone(&transport);
        let c = cancel.clone();
        tokio::spawn(async move { t.run(c, inbound_tx, ready_tx).await });

        tokio::time::timeout(Duration::from_secs(2), ready_rx.recv())
            .await
            .expect("ready must fire")
            .expect("channel open");

        handle
            .inbound_tx
            .send(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#.to_string())
            .unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(2), inbound_rx.recv())
            .await
            .expect("timed out")
            .expect("channel open");
        assert_eq!(msg, r#"{"jsonrpc":"2.0","id":1,"result":{}}"#);
    }

    /// Dropping every inject sender ends the run cleanly.
    #[tokio::test]
    async fn test_run_ends_when_handle_dropped() {
        let (transport, handle) = FakeTransport::new();
        let transport = Arc::new(transport);

        let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
        let (ready_tx, _ready_rx) = mpsc::unbounded_channel();

        let t = Arc::clone(&transport);
        let run = tokio::spawn(async move {
            t.run(CancellationToken::new(), inbound_tx, ready_tx).await
        });

        drop(handle);
        // The transport's own inject_tx also keeps the queue open; drop the
        // transport to close it fully.
        drop(transport);

        let outcome = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("run must end")
            .expect("task must not panic");
        assert!(outcome.is_ok());
    }

    /// `send()` returns an error when the handle is dropped.
    #[tokio::test]
    async fn test_send_fails_after_handle_dropped() {
        let (transport, handle) = FakeTransport::new();
        drop(handle);

        let result = transport.send("test".to_string()).await;
        assert!(result.is_err());
    }

    /// `inject_response` serializes and queues a `serde_json::Value`.
    #[tokio::test]
    async fn test_inject_response_serializes_value() {
        let (transport, _handle) = FakeTransport::new();
        let transport = Arc::new(transport);

        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        let (ready_tx, _ready_rx) = mpsc::unbounded_channel();
        let t = Arc::clone(&transport);
        tokio::spawn(async move {
            t.run(CancellationToken::new(), inbound_tx, ready_tx).await
        });

        transport.inject_response(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 42,
            "result": { "status": "ok" }
        }));

        let msg = tokio::time::timeout(Duration::from_secs(2), inbound_rx.recv())
            .await
            .expect("timed out")
            .expect("channel open");
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["id"], 42);
        assert_eq!(parsed["result"]["status"], "ok");
    }
}
