//! Downstream HTTP surface of the gateway
//!
//! Routes:
//!
//! - `GET  /mcp/sse`       -- authenticated SSE stream (module `sse`)
//! - `POST /mcp/messages`  -- downstream JSON-RPC ingress (module `messages`)
//! - `GET  /api/tools`     -- unfiltered tool list, admin boundary (module `admin`)
//! - `POST /api/reload`    -- re-read the store and swap the upstream set
//!
//! The admin CRUD surface, dashboard, and static file serving live outside
//! this crate; only the two `/api` handlers the core itself backs are
//! mounted here.

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue};
use axum::routing::{get, post};
use axum::Router;

use crate::config::Config;
use crate::gateway::Gateway;
use crate::session::SessionManager;
use crate::storage::SqliteStore;

pub mod admin;
pub mod messages;
pub mod sse;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The upstream dispatcher.
    pub gateway: Arc<Gateway>,
    /// Live downstream sessions.
    pub sessions: Arc<SessionManager>,
    /// Configuration store (servers and API keys).
    pub store: Arc<SqliteStore>,
    /// Process configuration.
    pub config: Arc<Config>,
}

/// Build the gateway's router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/mcp/sse", get(sse::handle_sse))
        .route("/mcp/messages", post(messages::handle_message))
        .route("/api/tools", get(admin::list_all_tools))
        .route("/api/reload", post(admin::reload_upstreams))
        .with_state(state)
}

/// Extract the bearer token from an `Authorization` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// CORS headers for the SSE response: mirror a permitted `Origin` with
/// credentials, fall back to `*` otherwise.
pub(crate) fn cors_headers(origin: Option<&str>, config: &Config) -> Vec<(&'static str, HeaderValue)> {
    match origin {
        Some(origin) if config.origin_allowed(origin) => match HeaderValue::from_str(origin) {
            Ok(value) => vec![
                ("access-control-allow-origin", value),
                (
                    "access-control-allow-credentials",
                    HeaderValue::from_static("true"),
                ),
            ],
            Err(_) => vec![(
                "access-control-allow-origin",
                HeaderValue::from_static("*"),
            )],
        },
        _ => vec![(
            "access-control-allow-origin",
            HeaderValue::from_static("*"),
        )],
    }
}
