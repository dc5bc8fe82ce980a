//! SSE transport for remote HTTP+SSE MCP servers
//!
//! This module implements [`SseTransport`], the client side of the
//! HTTP+SSE MCP transport: a long-polling GET carries server-to-client
//! messages as SSE events, and client-to-server messages are POSTed to an
//! endpoint the server announces over the stream.
//!
//! # Protocol
//!
//! - The GET is issued with `Accept: text/event-stream` and, when an auth
//!   token is configured, `Authorization: Bearer <token>`.
//! - An event named `endpoint` carries in its `data:` the URL (possibly
//!   relative to the GET URL) to POST subsequent JSON-RPC messages to.
//!   Receiving it resolves and stores the POST target and signals
//!   readiness.
//! - Every other `data:` payload is one complete inbound JSON-RPC message.
//!
//! A POST that returns HTTP >= 400 fails that send but leaves the
//! long-poll untouched; the stream only ends when the server closes it or
//! the transport is cancelled.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{OneMcpError, Result};
use crate::mcp::transport::Transport;

/// One parsed SSE event block.
#[derive(Debug, Default, PartialEq, Eq)]
struct SseEvent {
    /// Value of the `event:` field, if any (default event type otherwise).
    event: Option<String>,
    /// Joined `data:` lines.
    data: String,
}

/// Client transport for an upstream HTTP+SSE MCP server.
///
/// # Examples
///
/// ```no_run
/// use one_mcp::mcp::transport::sse::SseTransport;
///
/// let transport = SseTransport::new(
///     url::Url::parse("http://localhost:3000/sse").unwrap(),
///     Some("secret-token".to_string()),
/// );
/// ```
#[derive(Debug)]
pub struct SseTransport {
    /// The long-poll GET URL.
    url: url::Url,
    /// Bearer token attached to the GET and every POST. Newlines are
    /// stripped at construction so a stored token cannot inject headers.
    auth_token: Option<String>,
    /// Underlying reqwest HTTP client.
    http_client: reqwest::Client,
    /// POST target announced by the server's `endpoint` event. `None`
    /// until the current run has seen one.
    post_url: Arc<RwLock<Option<url::Url>>>,
}

impl SseTransport {
    /// Construct a new [`SseTransport`] targeting `url`.
    ///
    /// No network I/O is performed at construction time; the long-poll is
    /// opened by [`Transport::run`].
    ///
    /// # Arguments
    ///
    /// * `url` - The SSE GET URL of the upstream server.
    /// * `auth_token` - Optional bearer token. CR/LF characters are
    ///   stripped before the token is ever placed in a header.
    pub fn new(url: url::Url, auth_token: Option<String>) -> Self {
        let auth_token =
            auth_token.map(|t| t.chars().filter(|c| *c != '\n' && *c != '\r').collect());
        Self {
            url,
            auth_token,
            http_client: reqwest::Client::new(),
            post_url: Arc::new(RwLock::new(None)),
        }
    }

    fn apply_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => req.header("Authorization", format!("Bearer {token}")),
            None => req,
        }
    }

    /// Handle one parsed SSE event from the long-poll.
    async fn handle_event(
        &self,
        event: SseEvent,
        inbound_tx: &mpsc::UnboundedSender<String>,
        ready_tx: &mpsc::UnboundedSender<()>,
        ready_sent: &mut bool,
    ) {
        if event.data.is_empty() {
            return;
        }

        if event.event.as_deref() == Some("endpoint") {
            // The endpoint URL may be relative to the GET URL.
            match self.url.join(event.data.trim()) {
                Ok(resolved) => {
                    tracing::debug!(endpoint = %resolved, "sse upstream announced post endpoint");
                    *self.post_url.write().await = Some(resolved);
                    if !*ready_sent {
                        *ready_sent = true;
                        let _ = ready_tx.send(());
                    }
                }
                Err(e) => {
                    tracing::warn!("sse upstream sent unparseable endpoint {:?}: {e}", event.data);
                }
            }
            return;
        }

        let _ = inbound_tx.send(event.data);
    }
}

#[async_trait::async_trait]
impl Transport for SseTransport {
    /// Open the long-poll GET and pump SSE events until the server closes
    /// the stream or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`OneMcpError::Transport`] when the GET cannot be
    /// established, returns a non-success status, or the body stream
    /// fails mid-flight. A server-side close and a cancellation both
    /// return `Ok(())`.
    async fn run(
        &self,
        cancel: CancellationToken,
        inbound_tx: mpsc::UnboundedSender<String>,
        ready_tx: mpsc::UnboundedSender<()>,
    ) -> Result<()> {
        // Forget the previous run's endpoint; the server may move it.
        *self.post_url.write().await = None;

        let req = self
            .apply_auth(self.http_client.get(self.url.as_str()))
            .header("Accept", "text/event-stream");

        let response = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            r = req.send() => r.map_err(|e| {
                anyhow::anyhow!(OneMcpError::Transport(format!(
                    "SSE GET {} failed: {e}",
                    self.url
                )))
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow::anyhow!(OneMcpError::Transport(format!(
                "SSE GET {} returned HTTP {status}",
                self.url
            ))));
        }

        use futures::StreamExt;

        let byte_stream = response.bytes_stream();
        tokio::pin!(byte_stream);

        let mut buffer = String::new();
        let mut ready_sent = false;

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                c = byte_stream.next() => c,
            };

            let chunk = match chunk {
                // Server closed the long-poll; clean exit.
                None => break,
                Some(Ok(c)) => c,
                Some(Err(e)) => {
                    return Err(anyhow::anyhow!(OneMcpError::Transport(format!(
                        "SSE stream error: {e}"
                    ))));
                }
            };

            append_chunk(&mut buffer, &chunk);

            // SSE events are separated by blank lines.
            while let Some((block, rest)) = split_event_block(&buffer) {
                let event = parse_event_block(&block);
                buffer = rest;
                self.handle_event(event, &inbound_tx, &ready_tx, &mut ready_sent)
                    .await;
            }
        }

        // Flush a trailing event that was not terminated by a blank line.
        if !buffer.is_empty() {
            let event = parse_event_block(&buffer);
            self.handle_event(event, &inbound_tx, &ready_tx, &mut ready_sent)
                .await;
        }

        Ok(())
    }

    /// POST one JSON-RPC message to the announced endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`OneMcpError::NotReady`] before the `endpoint` event has
    /// arrived, and [`OneMcpError::Transport`] when the POST fails or the
    /// server answers with HTTP >= 400. Neither closes the long-poll.
    async fn send(&self, message: String) -> Result<()> {
        let target = {
            let guard = self.post_url.read().await;
            guard.clone().ok_or_else(|| {
                OneMcpError::NotReady("sse transport has no post endpoint yet".to_string())
            })?
        };

        let response = self
            .apply_auth(self.http_client.post(target.as_str()))
            .header("Content-Type", "application/json")
            .body(message)
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(OneMcpError::Transport(format!("SSE POST failed: {e}")))
            })?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(anyhow::anyhow!(OneMcpError::Transport(format!(
                "SSE POST returned HTTP {status}"
            ))));
        }

        Ok(())
    }
}

/// Append a raw byte chunk to the line buffer, replacing invalid UTF-8.
fn append_chunk(buffer: &mut String, chunk: &Bytes) {
    buffer.push_str(&String::from_utf8_lossy(chunk));
}

/// Split the earliest complete event block off the buffer.
///
/// Returns `(block, remainder)` when a blank-line separator (`\n\n` or
/// `\r\n\r\n`) is present, `None` while the event is still partial.
fn split_event_block(buffer: &str) -> Option<(String, String)> {
    let lf = buffer.find("\n\n").map(|p| (p, 2));
    let crlf = buffer.find("\r\n\r\n").map(|p| (p, 4));
    let (pos, sep_len) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some((
        buffer[..pos].to_string(),
        buffer[pos + sep_len..].to_string(),
    ))
}

/// Parse a single SSE event block (the text between two blank lines).
///
/// `data:` lines are joined with newlines; an `event:` field names the
/// event type. `id:`, `retry:` and comment lines are ignored -- the
/// gateway reconnects from scratch, it does not resume streams.
fn parse_event_block(block: &str) -> SseEvent {
    let mut data_lines: Vec<&str> = Vec::new();
    let mut event_type: Option<String> = None;

    for line in block.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim());
        } else if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim().to_string());
        }
        // `id:`, `retry:` and `:` comments are intentionally skipped.
    }

    SseEvent {
        event: event_type,
        data: data_lines.join("\n"),
    }
}
