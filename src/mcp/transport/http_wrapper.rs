//! HTTP wrapper transport: one REST endpoint as a virtual MCP server
//!
//! This module implements [`HttpWrapperTransport`], which makes a plain
//! REST endpoint look like an MCP server with exactly one tool. No
//! connection is opened up-front and nothing is spoken on the wire until a
//! tool call arrives: the transport intercepts outgoing JSON-RPC and
//! synthesizes the responses locally.
//!
//! - `initialize`, `ping`, and `tools/list` are answered entirely from the
//!   configured [`HttpToolConfig`].
//! - `tools/call` with the matching tool name builds an HTTP request from
//!   the merged default + caller arguments and wraps the response body (or
//!   error) into an MCP tool result.
//!
//! HTTP failures are NOT JSON-RPC errors: they come back as successful
//! responses with `result.isError = true`, matching how MCP servers report
//! tool-level failures.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{OneMcpError, Result};
use crate::mcp::transport::Transport;
use crate::mcp::types::{
    ERROR_METHOD_NOT_FOUND, ERROR_PARSE, METHOD_INITIALIZE, METHOD_INITIALIZED, METHOD_PING,
    METHOD_TOOLS_CALL, METHOD_TOOLS_LIST, PROTOCOL_VERSION,
};
use crate::storage::types::{HttpMethod, HttpToolConfig};

/// Name reported as `serverInfo.name` by every wrapped endpoint.
const WRAPPER_NAME: &str = "one-mcp-http-wrapper";

/// Version reported as `serverInfo.version` by every wrapped endpoint.
const WRAPPER_VERSION: &str = "1.0.0";

/// Virtual transport that wraps a single REST endpoint as an MCP server.
///
/// # Examples
///
/// ```no_run
/// use one_mcp::mcp::transport::http_wrapper::HttpWrapperTransport;
/// use one_mcp::storage::types::{HttpMethod, HttpToolConfig};
///
/// let config = HttpToolConfig {
///     name: "weather".to_string(),
///     description: "Current weather".to_string(),
///     method: HttpMethod::Get,
///     headers: Default::default(),
///     parameters: vec![],
/// };
/// let transport = HttpWrapperTransport::new(
///     "https://api.example.com/weather".to_string(),
///     None,
///     config,
/// );
/// ```
#[derive(Debug)]
pub struct HttpWrapperTransport {
    /// The wrapped REST endpoint.
    url: String,
    /// Optional bearer token for the wrapped endpoint.
    auth_token: Option<String>,
    /// The single tool this wrapper advertises.
    tool: HttpToolConfig,
    /// Underlying reqwest HTTP client (no explicit timeout; the client
    /// default applies).
    http_client: reqwest::Client,
    /// Inbound sender of the current run; synthesized responses go here.
    inbound_tx: Arc<RwLock<Option<mpsc::UnboundedSender<String>>>>,
}

impl HttpWrapperTransport {
    /// Construct a wrapper around `url` exposing `tool`.
    pub fn new(url: String, auth_token: Option<String>, tool: HttpToolConfig) -> Self {
        let auth_token =
            auth_token.map(|t| t.chars().filter(|c| *c != '\n' && *c != '\r').collect());
        Self {
            url,
            auth_token,
            tool,
            http_client: reqwest::Client::new(),
            inbound_tx: Arc::new(RwLock::new(None)),
        }
    }

    /// Push one synthesized response onto the inbound channel.
    async fn reply(&self, response: Value) -> Result<()> {
        let guard = self.inbound_tx.read().await;
        let tx = guard.as_ref().ok_or_else(|| {
            OneMcpError::NotReady("http wrapper transport is not running".to_string())
        })?;
        let serialized = serde_json::to_string(&response)?;
        tx.send(serialized).map_err(|e| {
            anyhow::anyhow!(OneMcpError::Transport(format!("inbound channel closed: {e}")))
        })
    }

    /// Execute the wrapped REST call and shape the tool result.
    ///
    /// Transport and HTTP-status failures are folded into a successful
    /// tool result with `isError = true`; only argument plumbing can fail
    /// the JSON-RPC layer.
    async fn invoke_endpoint(&self, arguments: &serde_json::Map<String, Value>) -> Value {
        let mut req = match self.tool.method {
            HttpMethod::Get => {
                let pairs: Vec<(String, String)> = arguments
                    .iter()
                    .map(|(k, v)| (k.clone(), query_value(v)))
                    .collect();
                self.http_client.get(&self.url).query(&pairs)
            }
            HttpMethod::Post => self.http_client.post(&self.url).json(arguments),
            HttpMethod::Put => self.http_client.put(&self.url).json(arguments),
            HttpMethod::Delete => self.http_client.delete(&self.url).json(arguments),
        };

        for (name, value) in &self.tool.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        let response = match req.send().await {
            Ok(r) => r,
            Err(e) => return tool_error(format!("request to {} failed: {e}", self.url)),
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() >= 400 {
            return tool_error(format!("HTTP {status}: {body}"));
        }

        json!({
            "content": [{ "type": "text", "text": body }]
        })
    }

    /// Dispatch one intercepted JSON-RPC message and synthesize the reply.
    async fn dispatch(&self, message: &str) -> Result<()> {
        let parsed: Value = match serde_json::from_str(message) {
            Ok(v) => v,
            Err(e) => {
                return self
                    .reply(error_response(
                        Value::Null,
                        ERROR_PARSE,
                        format!("parse error: {e}"),
                    ))
                    .await;
            }
        };

        let id = parsed.get("id").cloned().unwrap_or(Value::Null);
        let method = parsed.get("method").and_then(|m| m.as_str()).unwrap_or("");

        match method {
            METHOD_INITIALIZE => {
                self.reply(success_response(
                    id,
                    json!({
                        "protocolVersion": PROTOCOL_VERSION,
                        "capabilities": { "tools": { "listChanged": false } },
                        "serverInfo": { "name": WRAPPER_NAME, "version": WRAPPER_VERSION }
                    }),
                ))
                .await
            }
            METHOD_INITIALIZED => Ok(()),
            METHOD_PING => self.reply(success_response(id, json!("pong"))).await,
            METHOD_TOOLS_LIST => {
                self.reply(success_response(
                    id,
                    json!({ "tools": [tool_descriptor(&self.tool)] }),
                ))
                .await
            }
            METHOD_TOOLS_CALL => {
                let params = parsed.get("params").cloned().unwrap_or(Value::Null);
                let name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
                if name != self.tool.name {
                    return self
                        .reply(error_response(
                            id,
                            ERROR_METHOD_NOT_FOUND,
                            format!("unknown tool: {name}"),
                        ))
                        .await;
                }

                let arguments = merge_arguments(&self.tool, params.get("arguments"));
                let result = self.invoke_endpoint(&arguments).await;
                self.reply(success_response(id, result)).await
            }
            other => {
                self.reply(error_response(
                    id,
                    ERROR_METHOD_NOT_FOUND,
                    format!("method not found: {other}"),
                ))
                .await
            }
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpWrapperTransport {
    /// Signal readiness immediately and park until cancellation.
    ///
    /// The wrapper has no persistent upstream connection; the run exists
    /// only to own the inbound channel for synthesized responses.
    async fn run(
        &self,
        cancel: CancellationToken,
        inbound_tx: mpsc::UnboundedSender<String>,
        ready_tx: mpsc::UnboundedSender<()>,
    ) -> Result<()> {
        *self.inbound_tx.write().await = Some(inbound_tx);
        let _ = ready_tx.send(());

        cancel.cancelled().await;

        *self.inbound_tx.write().await = None;
        Ok(())
    }

    /// Intercept one outgoing JSON-RPC message and synthesize its reply.
    ///
    /// # Errors
    ///
    /// Returns [`OneMcpError::NotReady`] when called outside a run.
    async fn send(&self, message: String) -> Result<()> {
        self.dispatch(&message).await
    }
}

/// Build the single advertised tool from its config.
///
/// The input schema is `{type: "object", properties, required?}`; a
/// parameter lands in `required` iff it is required AND has no default.
fn tool_descriptor(tool: &HttpToolConfig) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required: Vec<String> = Vec::new();

    for param in &tool.parameters {
        let mut prop = serde_json::Map::new();
        prop.insert("type".to_string(), json!(param.param_type.as_str()));
        prop.insert("description".to_string(), json!(param.description));
        if !param.default.is_empty() {
            prop.insert("default".to_string(), json!(param.default));
        }
        properties.insert(param.name.clone(), Value::Object(prop));

        if param.required && param.default.is_empty() {
            required.push(param.name.clone());
        }
    }

    let mut schema = serde_json::Map::new();
    schema.insert("type".to_string(), json!("object"));
    schema.insert("properties".to_string(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), json!(required));
    }

    json!({
        "name": tool.name,
        "description": tool.description,
        "inputSchema": Value::Object(schema)
    })
}

/// Merge configured defaults with caller arguments; the caller wins
/// key-by-key.
fn merge_arguments(
    tool: &HttpToolConfig,
    caller: Option<&Value>,
) -> serde_json::Map<String, Value> {
    let mut merged = serde_json::Map::new();

    for param in &tool.parameters {
        if !param.default.is_empty() {
            merged.insert(param.name.clone(), json!(param.default));
        }
    }

    if let Some(Value::Object(args)) = caller {
        for (k, v) in args {
            merged.insert(k.clone(), v.clone());
        }
    }

    merged
}

/// Render an argument value as a query-string value.
fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A tool-level failure: a *successful* JSON-RPC result with `isError`.
fn tool_error(message: String) -> Value {
    json!({
        "content": [{ "type": "text", "text": message }],
        "isError": true
    })
}

fn success_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: Value, code: i64, message: String) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}
