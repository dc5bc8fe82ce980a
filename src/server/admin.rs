//! Admin boundary handlers
//!
//! The admin surface proper (CRUD, authentication, dashboard) lives
//! outside this crate. These two handlers are the boundary the core
//! itself backs: the unfiltered tool listing the dashboard renders, and
//! the reload hook the admin surface calls after it mutates the store.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::server::AppState;

/// Handle `GET /api/tools`: every upstream's tools, permission-free.
pub async fn list_all_tools(State(state): State<AppState>) -> Response {
    let tools = state.gateway.all_tools().await;
    Json(json!({ "tools": tools })).into_response()
}

/// Handle `POST /api/reload`: re-read enabled servers from the store and
/// swap the gateway's upstream set.
pub async fn reload_upstreams(State(state): State<AppState>) -> Response {
    let configs = match state.store.list_enabled_servers() {
        Ok(configs) => configs,
        Err(e) => {
            tracing::error!("reload failed reading the store: {e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Store error").into_response();
        }
    };

    let count = configs.len();
    state.gateway.reload(configs).await;
    Json(json!({ "status": "ok", "upstreams": count })).into_response()
}
