//! Upstream MCP client: connect loop, handshake, and request correlation
//!
//! An [`UpstreamClient`] owns one [`Transport`] and keeps it connected for
//! the lifetime of the client: whenever a transport run ends, the connect
//! loop waits (5 s after an error, 1 s after a clean exit) and runs it
//! again, forever, until the client is stopped. There is no retry cap and
//! no backoff growth.
//!
//! On every readiness signal the client performs the MCP handshake
//! (`initialize` followed by `notifications/initialized`) and only then
//! starts serving [`UpstreamClient::call`]. A failed handshake leaves the
//! client unready; the connect loop reacts only to transport termination.
//!
//! # Correlation
//!
//! Outgoing requests get ids from a monotonic counter, serialized as bare
//! numbers. Each in-flight request parks a `oneshot` sender in the pending
//! map, keyed by the *stringified* id so that upstreams echoing the id back
//! as a string still correlate. Responses are delivered whole -- result or
//! error intact -- so callers can inspect upstream JSON-RPC errors (the
//! tool-list pagination fallback depends on seeing `-32602`).
//!
//! When a transport run ends, every pending slot is dropped and awaiting
//! callers fail fast with a connection-lost error instead of riding out
//! the 30-second timeout.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::error::{OneMcpError, Result};
use crate::mcp::transport::Transport;
use crate::mcp::types::{
    initialize_params, JsonRpcNotification, JsonRpcRequest, METHOD_INITIALIZE, METHOD_INITIALIZED,
};
use crate::storage::types::UpstreamServer;

/// Timeout applied to every upstream request.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Reconnect delay after a transport error.
const RETRY_AFTER_ERROR: Duration = Duration::from_secs(5);

/// Reconnect delay after a clean transport exit.
const RETRY_AFTER_CLEAN_EXIT: Duration = Duration::from_secs(1);

/// In-flight requests waiting for a response, keyed by stringified id.
type PendingMap = HashMap<String, oneshot::Sender<Value>>;

/// A connected (or connecting) upstream MCP server.
///
/// Created by the gateway on reload, stopped when a reload replaces the
/// set or the config is removed. All shared state lives behind its own
/// lock; no lock is held across transport I/O.
pub struct UpstreamClient {
    /// Config snapshot taken at construction.
    config: UpstreamServer,
    /// The transport this client drives.
    transport: Arc<dyn Transport>,
    /// Cancelling stops the connect loop and the transport.
    cancel: CancellationToken,
    /// True between a successful handshake and the next disconnect.
    ready: AtomicBool,
    /// Monotonic request-id counter.
    next_id: AtomicU64,
    /// In-flight requests.
    pending: Mutex<PendingMap>,
}

impl std::fmt::Debug for UpstreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamClient")
            .field("name", &self.config.name)
            .field("ready", &self.ready.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl UpstreamClient {
    /// Create a client for `config` driving `transport`.
    ///
    /// Nothing connects until [`UpstreamClient::start`] is called.
    pub fn new(config: UpstreamServer, transport: Arc<dyn Transport>) -> Arc<Self> {
        Arc::new(Self {
            config,
            transport,
            cancel: CancellationToken::new(),
            ready: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// The upstream's unique name (tool-name prefix).
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The upstream's store id; its decimal string is the permission
    /// server identifier.
    pub fn server_id(&self) -> i64 {
        self.config.id
    }

    /// Whether the client can currently serve calls.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Launch the connect loop as a background task.
    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move { client.connect_loop().await })
    }

    /// Stop the client: cancel the connect loop and close the transport.
    ///
    /// Idempotent. In-flight calls are unblocked with a connection-lost
    /// error as the current run tears down.
    pub fn stop(&self) {
        self.ready.store(false, Ordering::SeqCst);
        self.cancel.cancel();
    }

    /// Run the transport forever, reconnecting on every termination.
    async fn connect_loop(self: Arc<Self>) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
            let (ready_tx, ready_rx) = mpsc::unbounded_channel::<()>();

            let dispatcher = tokio::spawn(Arc::clone(&self).dispatch_inbound(inbound_rx));
            let handshaker = tokio::spawn(Arc::clone(&self).handshake_on_ready(ready_rx));

            let result = self
                .transport
                .run(self.cancel.clone(), inbound_tx, ready_tx)
                .await;

            // The handshaker may be mid-initialize against a dead pipe; stop
            // it before clearing the ready flag so it cannot re-mark a dead
            // connection ready.
            handshaker.abort();
            self.ready.store(false, Ordering::SeqCst);

            // Unblock every in-flight call: dropping the senders fails the
            // awaiting oneshot receivers immediately. The dispatcher ends on
            // its own once the run's channel closes.
            self.pending.lock().await.clear();
            drop(dispatcher);

            if self.cancel.is_cancelled() {
                break;
            }

            let delay = match &result {
                Ok(()) => {
                    tracing::info!(upstream = %self.config.name, "upstream connection ended, reconnecting");
                    RETRY_AFTER_CLEAN_EXIT
                }
                Err(e) => {
                    tracing::warn!(upstream = %self.config.name, "upstream connection failed: {e}");
                    RETRY_AFTER_ERROR
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::debug!(upstream = %self.config.name, "upstream client stopped");
    }

    /// Perform the MCP handshake each time the transport signals readiness.
    async fn handshake_on_ready(self: Arc<Self>, mut ready_rx: mpsc::UnboundedReceiver<()>) {
        while ready_rx.recv().await.is_some() {
            match self.handshake().await {
                Ok(()) => {
                    self.ready.store(true, Ordering::SeqCst);
                    tracing::info!(upstream = %self.config.name, "upstream ready");
                }
                Err(e) => {
                    tracing::warn!(upstream = %self.config.name, "initialize failed: {e}");
                }
            }
        }
    }

    /// Send `initialize` and, on success, `notifications/initialized`.
    async fn handshake(&self) -> Result<()> {
        let response = self
            .call(METHOD_INITIALIZE, Some(initialize_params()))
            .await?;

        if let Some(error) = response.get("error") {
            return Err(anyhow::anyhow!(OneMcpError::Transport(format!(
                "initialize rejected by {}: {error}",
                self.config.name
            ))));
        }

        let notification =
            JsonRpcNotification::new(METHOD_INITIALIZED, Some(serde_json::json!({})));
        self.transport
            .send(serde_json::to_string(&notification)?)
            .await?;
        Ok(())
    }

    /// Deliver inbound messages to their pending slots.
    ///
    /// Messages carrying an id go to the matching slot; everything else is
    /// a notification and is discarded.
    async fn dispatch_inbound(self: Arc<Self>, mut inbound_rx: mpsc::UnboundedReceiver<String>) {
        while let Some(raw) = inbound_rx.recv().await {
            let value: Value = match serde_json::from_str(&raw) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(upstream = %self.config.name, "unparseable upstream message: {e}");
                    continue;
                }
            };

            let Some(id) = value.get("id").filter(|id| !id.is_null()) else {
                tracing::debug!(
                    upstream = %self.config.name,
                    method = value.get("method").and_then(|m| m.as_str()).unwrap_or("?"),
                    "upstream notification discarded"
                );
                continue;
            };

            let key = id_key(id);
            let slot = self.pending.lock().await.remove(&key);
            match slot {
                Some(tx) => {
                    // The caller may have timed out already; that is fine.
                    let _ = tx.send(value);
                }
                None => {
                    tracing::debug!(upstream = %self.config.name, id = %key, "response for unknown id");
                }
            }
        }
    }

    /// Issue a JSON-RPC request and await the full response object.
    ///
    /// The returned value is the complete JSON-RPC response -- `result` or
    /// `error` intact -- so callers can forward it verbatim or inspect the
    /// error code.
    ///
    /// # Errors
    ///
    /// - [`OneMcpError::NotReady`] before the handshake completed (except
    ///   for `initialize` itself, which bootstraps the handshake)
    /// - [`OneMcpError::Timeout`] after 30 s without a response; the slot
    ///   is deregistered so silent upstreams cannot leak memory
    /// - [`OneMcpError::ConnectionLost`] when the transport run ends while
    ///   the request is in flight
    /// - [`OneMcpError::Transport`] when the send itself fails
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.call_with_timeout(method, params, CALL_TIMEOUT).await
    }

    /// [`UpstreamClient::call`] with an explicit timeout.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        if method != METHOD_INITIALIZE && !self.is_ready() {
            return Err(anyhow::anyhow!(OneMcpError::NotReady(self.config.name.clone())));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let key = id.to_string();
        let serialized = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        // Register the slot before sending so the response can never
        // arrive before we are ready to receive it.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(key.clone(), tx);

        if let Err(e) = self.transport.send(serialized).await {
            self.pending.lock().await.remove(&key);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                self.pending.lock().await.remove(&key);
                Err(anyhow::anyhow!(OneMcpError::Timeout {
                    server: self.config.name.clone(),
                    method: method.to_string(),
                }))
            }
            // Slot dropped: the transport run ended underneath us.
            Ok(Err(_)) => Err(anyhow::anyhow!(OneMcpError::ConnectionLost(
                self.config.name.clone()
            ))),
            Ok(Ok(response)) => Ok(response),
        }
    }
}

/// Stringify a JSON-RPC id for use as a pending-map key.
fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
