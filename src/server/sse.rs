//! Downstream SSE endpoint
//!
//! `GET /mcp/sse` authenticates the presented API key, registers a
//! session, and streams:
//!
//! 1. one `endpoint` event whose data is the absolute URL downstream
//!    clients must POST their JSON-RPC messages to (carrying the session
//!    id), then
//! 2. one `message` event per response the dispatch path enqueues,
//!
//! until the client disconnects, at which point the session is
//! deregistered by the stream's `Drop`.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};
use metrics::increment_counter;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::gateway::PermissionSet;
use crate::server::{bearer_token, cors_headers, AppState};
use crate::session::SessionManager;

/// Handle `GET /mcp/sse`.
pub async fn handle_sse(State(state): State<AppState>, headers: HeaderMap) -> Response {
    // Authenticate: exact match of the bearer token against api_keys.
    let Some(token) = bearer_token(&headers) else {
        return (StatusCode::UNAUTHORIZED, "Missing bearer token").into_response();
    };

    let api_key = match state.store.find_api_key(&token) {
        Ok(Some(key)) => key,
        Ok(None) => return (StatusCode::UNAUTHORIZED, "Invalid API key").into_response(),
        Err(e) => {
            tracing::error!("api key lookup failed: {e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Store error").into_response();
        }
    };

    let permissions = PermissionSet::from_api_key(&api_key);
    let (session, outbound_rx) = state.sessions.register(permissions);
    increment_counter!("one_mcp_sessions_opened_total");
    tracing::info!(session = %session.id, key = api_key.id, "downstream session connected");

    // The POST target announced to the client. TLS terminates in front of
    // the gateway, so the scheme comes from the forwarding proxy when one
    // is present.
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| state.config.bind_addr());
    let endpoint = format!("{scheme}://{host}/mcp/messages?sessionId={}", session.id);

    let endpoint_event = Event::default().event("endpoint").data(endpoint);
    let first = futures::stream::once(async move { Ok::<Event, Infallible>(endpoint_event) });
    let rest = SessionStream {
        inner: ReceiverStream::new(outbound_rx),
        sessions: Arc::clone(&state.sessions),
        id: session.id,
    };

    let sse = Sse::new(first.chain(rest)).keep_alive(KeepAlive::default());

    let origin = headers
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut response = sse.into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(
        "cache-control",
        axum::http::HeaderValue::from_static("no-cache"),
    );
    response_headers.insert(
        "connection",
        axum::http::HeaderValue::from_static("keep-alive"),
    );
    for (name, value) in cors_headers(origin.as_deref(), &state.config) {
        response_headers.insert(name, value);
    }
    response
}

/// The per-session message pump: maps queued responses to SSE `message`
/// events and deregisters the session when the client disconnects.
struct SessionStream {
    inner: ReceiverStream<String>,
    sessions: Arc<SessionManager>,
    id: Uuid,
}

impl Stream for SessionStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(message)) => {
                Poll::Ready(Some(Ok(Event::default().event("message").data(message))))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SessionStream {
    /// The axum response stream is dropped when the client disconnects;
    /// that is the session's end of life.
    fn drop(&mut self) {
        self.sessions.remove(&self.id);
        tracing::info!(session = %self.id, "downstream session closed");
    }
}
