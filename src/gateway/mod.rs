//! Gateway dispatch: one virtual MCP server over many upstreams
//!
//! The [`Gateway`] owns the set of running [`UpstreamClient`]s, keyed by
//! upstream name. Downstream JSON-RPC requests are dispatched here:
//! lifecycle methods (`initialize`, `ping`, ...) are answered locally,
//! `tools/list` fans out to every upstream in parallel, and `tools/call`
//! is routed to the upstream encoded in the tool-name prefix.
//!
//! # Tool namespacing
//!
//! Every advertised tool name is rewritten to `<upstream>__<tool>` on the
//! way downstream, and the prefix is stripped exactly once on the way
//! back up. Upstream names never contain `__`, so the first separator is
//! always the boundary.
//!
//! # Availability
//!
//! A failing upstream never breaks `tools/list`: it simply contributes no
//! tools. A failing `tools/call` IS surfaced, as is any error the
//! upstream itself returned.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::increment_counter;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::error::{OneMcpError, Result};
use crate::mcp::transport::http_wrapper::HttpWrapperTransport;
use crate::mcp::transport::sse::SseTransport;
use crate::mcp::transport::stdio::StdioTransport;
use crate::mcp::transport::Transport;
use crate::mcp::types::{
    server_capabilities, JsonRpcResponse, McpTool, ERROR_INVALID_PARAMS, ERROR_METHOD_NOT_FOUND,
    ERROR_UPSTREAM, GATEWAY_NAME, GATEWAY_VERSION, METHOD_CALL_TOOL_ALIAS,
    METHOD_COMPLETION_COMPLETE, METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_LOGGING_SET_LEVEL,
    METHOD_PING, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, PROTOCOL_VERSION, TOOL_NAME_SEPARATOR,
};
use crate::mcp::upstream::UpstreamClient;
use crate::storage::types::{TransportKind, UpstreamServer};

pub mod permissions;

pub use permissions::PermissionSet;

/// The gateway's name-keyed set of running upstream clients.
///
/// Owned process-wide; hot reloads replace the whole set atomically under
/// the write lock. Dispatch paths take the read lock only long enough to
/// snapshot the clients they need -- never across a call.
pub struct Gateway {
    upstreams: RwLock<HashMap<String, Arc<UpstreamClient>>>,
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

impl Gateway {
    /// Create a gateway with no upstreams.
    pub fn new() -> Self {
        Self {
            upstreams: RwLock::new(HashMap::new()),
        }
    }

    /// Replace the running upstream set with clients for `configs`.
    ///
    /// Under the write lock: every current client is stopped, then one
    /// client per **enabled** config is built and started, and the map is
    /// swapped. Disabled configs are skipped; a config whose transport
    /// cannot be built (bad URL, forbidden stdio characters) is logged and
    /// skipped so one broken entry cannot block a reload.
    pub async fn reload(&self, configs: Vec<UpstreamServer>) {
        let mut guard = self.upstreams.write().await;

        for client in guard.values() {
            client.stop();
        }

        let mut next: HashMap<String, Arc<UpstreamClient>> = HashMap::new();
        for config in configs {
            if !config.enabled {
                continue;
            }
            let name = config.name.clone();
            match build_transport(&config) {
                Ok(transport) => {
                    let client = UpstreamClient::new(config, transport);
                    client.start();
                    next.insert(name, client);
                }
                Err(e) => {
                    tracing::warn!(upstream = %name, "skipping upstream on reload: {e}");
                }
            }
        }

        tracing::info!(upstreams = next.len(), "upstream set reloaded");
        *guard = next;
    }

    /// Stop every upstream client (shutdown path).
    pub async fn shutdown(&self) {
        let guard = self.upstreams.read().await;
        for client in guard.values() {
            client.stop();
        }
    }

    /// Names and readiness of the running upstream set.
    pub async fn upstream_status(&self) -> Vec<(String, bool)> {
        let guard = self.upstreams.read().await;
        let mut status: Vec<(String, bool)> = guard
            .values()
            .map(|c| (c.name().to_string(), c.is_ready()))
            .collect();
        status.sort();
        status
    }

    /// Dispatch one downstream JSON-RPC message.
    ///
    /// Returns `Ok(None)` for notifications (nothing to enqueue) and
    /// `Ok(Some(response))` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error only when `raw` is not valid JSON; the HTTP layer
    /// maps that to a 500.
    pub async fn handle_message(
        &self,
        raw: &[u8],
        permissions: &PermissionSet,
    ) -> Result<Option<Value>> {
        let request: Value = serde_json::from_slice(raw).map_err(OneMcpError::Serialization)?;

        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");

        let response = match method {
            METHOD_INITIALIZE => Some(self.initialize_response(id)),
            METHOD_INITIALIZED => None,
            METHOD_PING => Some(success(id, json!({}))),
            // Accepted without effect; the gateway has no adjustable level.
            METHOD_LOGGING_SET_LEVEL => Some(success(id, json!({}))),
            METHOD_COMPLETION_COMPLETE => Some(success(
                id,
                json!({ "completion": { "values": [], "total": 0, "hasMore": false } }),
            )),
            METHOD_TOOLS_LIST => Some(self.tools_list(id, permissions).await),
            METHOD_TOOLS_CALL | METHOD_CALL_TOOL_ALIAS => {
                let params = request.get("params").cloned().unwrap_or(Value::Null);
                Some(self.tools_call(id, &params, permissions).await)
            }
            _ => Some(error(id, ERROR_METHOD_NOT_FOUND, "Method not supported")),
        };

        Ok(response)
    }

    /// Synthesize the local `initialize` response. No upstream calls.
    fn initialize_response(&self, id: Value) -> Value {
        success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": server_capabilities(),
                "serverInfo": { "name": GATEWAY_NAME, "version": GATEWAY_VERSION }
            }),
        )
    }

    /// Aggregate `tools/list` across every upstream, permission-filtered.
    async fn tools_list(&self, id: Value, permissions: &PermissionSet) -> Value {
        increment_counter!("one_mcp_tools_list_total");
        let tools = self.aggregate_tools(permissions).await;
        success(id, json!({ "tools": tools }))
    }

    /// Fan out one task per upstream and merge the results.
    ///
    /// Per-upstream order is preserved; order across upstreams follows
    /// task completion and is deliberately unspecified.
    async fn aggregate_tools(&self, permissions: &PermissionSet) -> Vec<McpTool> {
        let snapshot: Vec<Arc<UpstreamClient>> = {
            let guard = self.upstreams.read().await;
            guard.values().cloned().collect()
        };

        let tasks: Vec<_> = snapshot
            .into_iter()
            .map(|client| {
                let permissions = permissions.clone();
                tokio::spawn(async move { collect_upstream_tools(client, permissions).await })
            })
            .collect();

        let mut merged = Vec::new();
        for task in tasks {
            if let Ok(tools) = task.await {
                merged.extend(tools);
            }
        }
        merged
    }

    /// Aggregate every upstream's tools without permission filtering.
    ///
    /// Admin-surface entry point; downstream sessions never reach it.
    pub async fn all_tools(&self) -> Vec<McpTool> {
        self.aggregate_tools(&PermissionSet::allow_all()).await
    }

    /// Route one `tools/call` to the upstream named in the tool prefix.
    async fn tools_call(&self, id: Value, params: &Value, permissions: &PermissionSet) -> Value {
        increment_counter!("one_mcp_tool_calls_total");

        let name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
        let Some((upstream_name, tool_name)) = name.split_once(TOOL_NAME_SEPARATOR) else {
            return error(id, ERROR_INVALID_PARAMS, "Invalid tool name format");
        };

        let client = {
            let guard = self.upstreams.read().await;
            guard.get(upstream_name).cloned()
        };
        let Some(client) = client else {
            return error(id, ERROR_INVALID_PARAMS, "Server not found");
        };

        if !permissions.allows(client.server_id(), name) {
            return error(id, ERROR_UPSTREAM, "Permission denied");
        }

        let mut forward = json!({ "name": tool_name });
        if let Some(arguments) = params.get("arguments") {
            forward["arguments"] = arguments.clone();
        }

        match client.call(METHOD_TOOLS_CALL, Some(forward)).await {
            // Forward the upstream response verbatim -- including any
            // JSON-RPC error it carries -- under the downstream id.
            Ok(mut response) => {
                response["id"] = id;
                response
            }
            Err(e) => error(id, ERROR_UPSTREAM, e.to_string()),
        }
    }

    /// Insert a pre-built client, bypassing transport construction.
    #[cfg(test)]
    pub(crate) async fn insert_client(&self, client: Arc<UpstreamClient>) {
        let mut guard = self.upstreams.write().await;
        guard.insert(client.name().to_string(), client);
    }
}

/// Build the transport a config calls for.
///
/// # Errors
///
/// Returns [`OneMcpError::Validation`] when required fields are missing or
/// fail validation (URL parse, stdio metacharacters).
pub fn build_transport(config: &UpstreamServer) -> Result<Arc<dyn Transport>> {
    match config.transport {
        TransportKind::Sse => {
            let raw = config.url.as_deref().ok_or_else(|| {
                OneMcpError::Validation(format!("sse server {} has no url", config.name))
            })?;
            let url = url::Url::parse(raw).map_err(|e| {
                OneMcpError::Validation(format!("sse server {} has a bad url: {e}", config.name))
            })?;
            Ok(Arc::new(SseTransport::new(url, config.auth_token.clone())))
        }
        TransportKind::Stdio => {
            let command = config.command.clone().ok_or_else(|| {
                OneMcpError::Validation(format!("stdio server {} has no command", config.name))
            })?;
            let transport =
                StdioTransport::new(command, config.args.clone(), config.env.clone())?;
            Ok(Arc::new(transport))
        }
        TransportKind::Http => {
            let url = config.url.clone().ok_or_else(|| {
                OneMcpError::Validation(format!("http server {} has no url", config.name))
            })?;
            let tool = config.tool_config.clone().ok_or_else(|| {
                OneMcpError::Validation(format!("http server {} has no tool_config", config.name))
            })?;
            Ok(Arc::new(HttpWrapperTransport::new(
                url,
                config.auth_token.clone(),
                tool,
            )))
        }
    }
}

/// Collect one upstream's full (paginated) tool list, prefixed and
/// permission-filtered.
///
/// The first page is requested with no `params` at all; an upstream that
/// answers `-32602` is retried with `{}` and then `{"cursor": null}`.
/// Any other error -- and exhaustion of all three shapes -- ends this
/// upstream's contribution; pages already collected are kept. Subsequent
/// pages follow `nextCursor` until it comes back empty.
async fn collect_upstream_tools(
    client: Arc<UpstreamClient>,
    permissions: PermissionSet,
) -> Vec<McpTool> {
    let mut tools: Vec<McpTool> = Vec::new();

    let first_shapes: [Option<Value>; 3] =
        [None, Some(json!({})), Some(json!({ "cursor": null }))];

    let mut page: Option<Value> = None;
    for shape in first_shapes {
        match client.call(METHOD_TOOLS_LIST, shape).await {
            Ok(response) => {
                if let Some(code) = error_code(&response) {
                    if code == ERROR_INVALID_PARAMS {
                        // Strict upstream; try the next parameter shape.
                        continue;
                    }
                    tracing::warn!(
                        upstream = client.name(),
                        code,
                        "tools/list rejected, skipping upstream"
                    );
                    return tools;
                }
                page = Some(response);
                break;
            }
            Err(e) => {
                tracing::warn!(upstream = client.name(), "tools/list failed: {e}");
                return tools;
            }
        }
    }
    let Some(mut response) = page else {
        tracing::warn!(
            upstream = client.name(),
            "tools/list rejected every parameter shape"
        );
        return tools;
    };

    loop {
        let result = response.get("result").cloned().unwrap_or(Value::Null);
        let parsed: crate::mcp::types::ListToolsResult = match serde_json::from_value(result) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(upstream = client.name(), "malformed tools/list result: {e}");
                return tools;
            }
        };

        for mut tool in parsed.tools {
            tool.name = format!("{}{}{}", client.name(), TOOL_NAME_SEPARATOR, tool.name);
            if permissions.allows(client.server_id(), &tool.name) {
                tools.push(tool);
            }
        }

        let cursor = match parsed.next_cursor {
            Some(c) if !c.is_empty() => c,
            _ => return tools,
        };

        response = match client
            .call(METHOD_TOOLS_LIST, Some(json!({ "cursor": cursor })))
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(upstream = client.name(), "tools/list page failed: {e}");
                return tools;
            }
        };
        if let Some(code) = error_code(&response) {
            tracing::warn!(upstream = client.name(), code, "tools/list page rejected");
            return tools;
        }
    }
}

/// Extract the JSON-RPC error code of a response, if it carries one.
fn error_code(response: &Value) -> Option<i64> {
    response.get("error")?.get("code")?.as_i64()
}

fn success(id: Value, result: Value) -> Value {
    serde_json::to_value(JsonRpcResponse::success(Some(id), result))
        .unwrap_or_else(|_| json!({ "jsonrpc": "2.0", "id": null }))
}

fn error(id: Value, code: i64, message: impl Into<String>) -> Value {
    serde_json::to_value(JsonRpcResponse::error(Some(id), code, message))
        .unwrap_or_else(|_| json!({ "jsonrpc": "2.0", "id": null }))
}
