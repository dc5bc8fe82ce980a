//! MCP protocol types and JSON-RPC 2.0 primitives
//!
//! All wire types exchanged with upstream servers and downstream clients.
//! Serde-serialized field names follow the MCP convention of camelCase via
//! `#[serde(rename_all = "camelCase")]` unless the field is already camelCase.
//!
//! The gateway speaks protocol revision **2024-11-05** on both sides.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Protocol constants
// ---------------------------------------------------------------------------

/// The protocol revision the gateway declares to both sides.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Name the gateway reports as `serverInfo.name` downstream and
/// `clientInfo.name` upstream.
pub const GATEWAY_NAME: &str = "one-mcp-gateway";

/// Version the gateway reports as `serverInfo.version` downstream.
pub const GATEWAY_VERSION: &str = "1.1.1";

/// Version the gateway reports as `clientInfo.version` upstream.
pub const GATEWAY_CLIENT_VERSION: &str = "1.0.0";

/// Separator between the upstream name and the original tool name in a
/// prefixed tool identifier. Upstream names must never contain it.
pub const TOOL_NAME_SEPARATOR: &str = "__";

// ---------------------------------------------------------------------------
// Method constants
// ---------------------------------------------------------------------------

/// Handshake request establishing protocol version and capabilities.
pub const METHOD_INITIALIZE: &str = "initialize";
/// Notification sent after a successful `initialize` exchange.
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
/// Liveness check.
pub const METHOD_PING: &str = "ping";
/// Paginated tool discovery.
pub const METHOD_TOOLS_LIST: &str = "tools/list";
/// Tool invocation.
pub const METHOD_TOOLS_CALL: &str = "tools/call";
/// Legacy alias for `tools/call` accepted from downstream clients.
pub const METHOD_CALL_TOOL_ALIAS: &str = "callTool";
/// Accepted and acknowledged without effect.
pub const METHOD_LOGGING_SET_LEVEL: &str = "logging/setLevel";
/// Argument completion; the gateway always answers with an empty set.
pub const METHOD_COMPLETION_COMPLETE: &str = "completion/complete";

// ---------------------------------------------------------------------------
// JSON-RPC error codes
// ---------------------------------------------------------------------------

/// Body is not valid JSON-RPC.
pub const ERROR_PARSE: i64 = -32700;
/// Unknown method.
pub const ERROR_METHOD_NOT_FOUND: i64 = -32601;
/// Malformed or unacceptable params (also: unknown upstream, bad tool name).
pub const ERROR_INVALID_PARAMS: i64 = -32602;
/// Server-defined failure: permission denial or upstream call failure.
pub const ERROR_UPSTREAM: i64 = -32000;

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 wire types
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request object.
///
/// `jsonrpc` MUST always be `"2.0"`. `id` is `None` only for notifications.
///
/// # Examples
///
/// ```
/// use one_mcp::mcp::types::JsonRpcRequest;
///
/// let req = JsonRpcRequest {
///     jsonrpc: "2.0".to_string(),
///     id: Some(serde_json::json!(1)),
///     method: "ping".to_string(),
///     params: None,
/// };
/// let json = serde_json::to_string(&req).unwrap();
/// assert!(!json.contains("params"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version identifier; always `"2.0"`.
    pub jsonrpc: String,
    /// Request correlation identifier. Present for requests, absent for notifications.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional method parameters. `None` omits the field entirely, which
    /// some upstreams require for `tools/list`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Build a request with the given numeric id.
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(serde_json::json!(id)),
            method: method.to_string(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 response object.
///
/// Exactly one of `result` or `error` is present in a valid response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version identifier; always `"2.0"`.
    pub jsonrpc: String,
    /// Mirrors the `id` from the corresponding request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    /// Successful result value; mutually exclusive with `error`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error object; mutually exclusive with `result`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Build a successful response mirroring `id`.
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Build an error response mirroring `id`.
    pub fn error(id: Option<serde_json::Value>, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// A JSON-RPC 2.0 error object.
///
/// Implements `Display` as `"JSON-RPC error {code}: {message}"`.
///
/// # Examples
///
/// ```
/// use one_mcp::mcp::types::JsonRpcError;
///
/// let e = JsonRpcError { code: -32601, message: "Method not supported".to_string(), data: None };
/// assert_eq!(e.to_string(), "JSON-RPC error -32601: Method not supported");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code as defined by JSON-RPC 2.0 or the MCP spec.
    pub code: i64,
    /// Human-readable error description.
    pub message: String,
    /// Optional additional error context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

/// A JSON-RPC 2.0 notification (a request with no `id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Protocol version identifier; always `"2.0"`.
    pub jsonrpc: String,
    /// The notification method name.
    pub method: String,
    /// Optional notification parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    /// Build a notification.
    pub fn new(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

// ---------------------------------------------------------------------------
// Identity and capability types
// ---------------------------------------------------------------------------

/// Identifies a client or server implementation by name and version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Implementation {
    /// Short name of the implementation (e.g. `"one-mcp-gateway"`).
    pub name: String,
    /// Version string.
    pub version: String,
}

/// Capabilities the gateway declares to every upstream during the handshake.
///
/// Fixed by design: `{roots: {listChanged: true}, sampling: {}}`.
pub fn client_capabilities() -> serde_json::Value {
    serde_json::json!({
        "roots": { "listChanged": true },
        "sampling": {}
    })
}

/// Capabilities the gateway declares to downstream clients.
///
/// Fixed by design; the gateway does not negotiate beyond this set.
pub fn server_capabilities() -> serde_json::Value {
    serde_json::json!({
        "tools": { "listChanged": true },
        "prompts": { "listChanged": false },
        "resources": { "listChanged": false, "subscribe": false },
        "logging": {}
    })
}

/// Parameters for the `initialize` request the gateway sends upstream.
pub fn initialize_params() -> serde_json::Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": client_capabilities(),
        "clientInfo": {
            "name": GATEWAY_NAME,
            "version": GATEWAY_CLIENT_VERSION
        }
    })
}

// ---------------------------------------------------------------------------
// Tool types
// ---------------------------------------------------------------------------

/// A tool advertised by an upstream server.
///
/// Only `name` is interpreted by the gateway (for prefixing and routing);
/// everything else passes through untouched via `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    /// Tool identifier; unique within one upstream.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON schema describing the tool's arguments.
    #[serde(rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
    /// Any additional fields the upstream attached; forwarded verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One page of a `tools/list` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// Tools on this page.
    #[serde(default)]
    pub tools: Vec<McpTool>,
    /// Opaque cursor for the next page; empty or absent when exhausted.
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}
