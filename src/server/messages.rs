//! Downstream message ingress
//!
//! `POST /mcp/messages?sessionId=<uuid>` carries one JSON-RPC message from
//! a downstream client. The session is looked up (404 when absent), the
//! message is dispatched through the gateway with the session's permission
//! snapshot, and a non-nil response is enqueued on the session's outbound
//! queue for the SSE writer. The HTTP reply is always 202 on success --
//! the JSON-RPC response travels over the SSE stream, not this request.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use uuid::Uuid;

use crate::server::AppState;

/// Query parameters of the message endpoint.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    /// Session id announced in the `endpoint` SSE event.
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// Handle `POST /mcp/messages`.
pub async fn handle_message(
    State(state): State<AppState>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    // A malformed id cannot name a live session; same outcome as unknown.
    let Ok(session_id) = Uuid::parse_str(&query.session_id) else {
        return (StatusCode::NOT_FOUND, "Session not found").into_response();
    };
    let Some(session) = state.sessions.get(&session_id) else {
        return (StatusCode::NOT_FOUND, "Session not found").into_response();
    };

    match state
        .gateway
        .handle_message(&body, &session.permissions)
        .await
    {
        Ok(Some(response)) => match serde_json::to_string(&response) {
            Ok(serialized) => {
                session.enqueue(serialized);
                StatusCode::ACCEPTED.into_response()
            }
            Err(e) => {
                tracing::error!(session = %session_id, "response serialization failed: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Serialization error").into_response()
            }
        },
        // Notifications produce nothing to enqueue.
        Ok(None) => StatusCode::ACCEPTED.into_response(),
        Err(e) => {
            tracing::warn!(session = %session_id, "dispatch failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Dispatch error: {e}")).into_response()
        }
    }
}
