//! Persistent data model for the gateway store
//!
//! These types mirror the rows of the embedded store. `args`, `env`, and
//! `tool_config` are persisted as JSON-serialized strings (the shape the
//! admin surface submits) and materialized here as real Rust types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{OneMcpError, Result};
use crate::mcp::transport::validate_command;
use crate::mcp::types::TOOL_NAME_SEPARATOR;

/// Which transport an upstream server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Long-polling GET + POST-back SSE server.
    Sse,
    /// Child process speaking line-delimited JSON on stdio.
    Stdio,
    /// Single REST endpoint wrapped as a one-tool MCP server.
    Http,
}

impl TransportKind {
    /// The string stored in the `transport_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Sse => "sse",
            TransportKind::Stdio => "stdio",
            TransportKind::Http => "http",
        }
    }

    /// Parse the stored column value.
    ///
    /// # Errors
    ///
    /// Returns [`OneMcpError::Validation`] for an unknown value.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "sse" => Ok(TransportKind::Sse),
            "stdio" => Ok(TransportKind::Stdio),
            "http" => Ok(TransportKind::Http),
            other => {
                Err(OneMcpError::Validation(format!("unknown transport type: {other}")).into())
            }
        }
    }
}

/// HTTP method of a wrapped REST endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// JSON-schema type of a wrapped tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
}

impl ParameterType {
    /// The JSON-schema `type` keyword for this parameter type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
        }
    }
}

/// One parameter of a wrapped REST tool.
///
/// A parameter with `required = true` and an empty `default` appears in the
/// emitted JSON-schema `required` list. A parameter with a non-empty
/// default is optional to callers and pre-populated before the upstream
/// request is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name; becomes a JSON-schema property.
    pub name: String,
    /// JSON-schema type.
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Whether callers must supply a value (when no default exists).
    #[serde(default)]
    pub required: bool,
    /// Default value, applied before caller arguments. Empty means none.
    #[serde(default)]
    pub default: String,
}

/// Configuration of the single tool an HTTP-wrapped upstream exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpToolConfig {
    /// Tool name exposed via `tools/list`.
    pub name: String,
    /// Tool description exposed via `tools/list`.
    #[serde(default)]
    pub description: String,
    /// HTTP method used for the wrapped endpoint.
    pub method: HttpMethod,
    /// Headers applied verbatim to every wrapped request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Parameters advertised in the tool's input schema.
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

/// Persistent description of one upstream server.
///
/// `id` is the store rowid; its decimal string is the server identifier
/// used by `allowed_servers` permission lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamServer {
    /// Store rowid (0 until persisted).
    #[serde(default)]
    pub id: i64,
    /// Unique name; used as the tool-name prefix and gateway map key.
    pub name: String,
    /// Transport this upstream speaks.
    pub transport: TransportKind,
    /// Server URL (sse and http transports).
    #[serde(default)]
    pub url: Option<String>,
    /// Bearer token attached to upstream requests (sse and http).
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Executable to spawn (stdio transport).
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments for the spawned executable.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overlaid on the gateway's own when spawning.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Wrapped-tool description (http transport).
    #[serde(default)]
    pub tool_config: Option<HttpToolConfig>,
    /// Disabled upstreams are kept in the store but never started.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl UpstreamServer {
    /// Validate the config before it is persisted or started.
    ///
    /// Checks the name (non-empty, free of the `__` separator) and the
    /// per-transport required fields; stdio commands additionally pass the
    /// shell-metacharacter filter.
    ///
    /// # Errors
    ///
    /// Returns [`OneMcpError::Validation`] describing the first problem
    /// found.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(OneMcpError::Validation("server name must not be empty".to_string()).into());
        }
        if self.name.contains(TOOL_NAME_SEPARATOR) {
            return Err(OneMcpError::Validation(format!(
                "server name must not contain {TOOL_NAME_SEPARATOR:?}: {}",
                self.name
            ))
            .into());
        }

        match self.transport {
            TransportKind::Sse => {
                if self.url.as_deref().unwrap_or("").is_empty() {
                    return Err(OneMcpError::Validation(format!(
                        "sse server {} requires a url",
                        self.name
                    ))
                    .into());
                }
            }
            TransportKind::Stdio => {
                let command = self.command.as_deref().unwrap_or("");
                validate_command(command, &self.args)?;
            }
            TransportKind::Http => {
                if self.url.as_deref().unwrap_or("").is_empty() {
                    return Err(OneMcpError::Validation(format!(
                        "http server {} requires a url",
                        self.name
                    ))
                    .into());
                }
                if self.tool_config.is_none() {
                    return Err(OneMcpError::Validation(format!(
                        "http server {} requires a tool_config",
                        self.name
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }
}

/// An API key authorizing downstream access.
///
/// Exactly one of the two permission encodings applies: a non-empty
/// `allowed_tools` list is authoritative and `allowed_servers` is ignored;
/// otherwise `allowed_servers` applies, and an empty list there means
/// allow-all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    /// Store rowid (0 until persisted).
    #[serde(default)]
    pub id: i64,
    /// Opaque bearer string presented by downstream clients.
    pub key: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Prefixed tool names this key may call, or `["*"]` for all.
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    /// Stringified upstream ids this key may reach.
    #[serde(default)]
    pub allowed_servers: Vec<String>,
}

/// Decode a stored JSON string list, tolerating empty and null columns.
pub(crate) fn parse_string_list(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str(raw).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sse_server(name: &str) -> UpstreamServer {
        UpstreamServer {
            id: 0,
            name: name.to_string(),
            transport: TransportKind::Sse,
            url: Some("http://localhost:3000/sse".to_string()),
            auth_token: None,
            command: None,
            args: vec![],
            env: HashMap::new(),
            tool_config: None,
            enabled: true,
        }
    }

    /// Transport kinds round-trip through their column representation.
    #[test]
    fn test_transport_kind_roundtrip() {
        for kind in [TransportKind::Sse, TransportKind::Stdio, TransportKind::Http] {
            assert_eq!(TransportKind::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(TransportKind::parse("websocket").is_err());
    }

    /// A name containing the namespace separator is rejected.
    #[test]
    fn test_validate_rejects_separator_in_name() {
        let server = sse_server("bad__name");
        assert!(server.validate().is_err());
    }

    /// SSE servers need a URL; stdio servers need a clean command.
    #[test]
    fn test_validate_per_transport_requirements() {
        let mut server = sse_server("fs");
        server.url = None;
        assert!(server.validate().is_err());

        let mut server = sse_server("fs");
        server.transport = TransportKind::Stdio;
        server.url = None;
        server.command = Some("node".to_string());
        server.args = vec!["server.js".to_string()];
        assert!(server.validate().is_ok());

        server.args = vec!["server.js; rm -rf /".to_string()];
        assert!(server.validate().is_err());
    }

    /// HTTP servers require both URL and tool_config.
    #[test]
    fn test_validate_http_requires_tool_config() {
        let mut server = sse_server("weather");
        server.transport = TransportKind::Http;
        assert!(server.validate().is_err());

        server.tool_config = Some(HttpToolConfig {
            name: "forecast".to_string(),
            description: String::new(),
            method: HttpMethod::Get,
            headers: HashMap::new(),
            parameters: vec![],
        });
        assert!(server.validate().is_ok());
    }

    /// `tool_config` deserializes from the admin surface's JSON shape.
    #[test]
    fn test_tool_config_deserializes_admin_shape() {
        let raw = r#"{
            "name": "weather",
            "description": "Current weather",
            "method": "GET",
            "headers": {"X-Api": "v1"},
            "parameters": [
                {"name": "q", "type": "string", "description": "city", "required": true, "default": ""},
                {"name": "units", "type": "string", "default": "metric"}
            ]
        }"#;
        let config: HttpToolConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.method, HttpMethod::Get);
        assert_eq!(config.parameters.len(), 2);
        assert!(config.parameters[0].required);
        assert!(!config.parameters[1].required);
        assert_eq!(config.parameters[1].default, "metric");
    }

    /// Stored list columns tolerate empty strings and malformed JSON.
    #[test]
    fn test_parse_string_list_tolerant() {
        assert_eq!(parse_string_list(""), Vec::<String>::new());
        assert_eq!(parse_string_list("[]"), Vec::<String>::new());
        assert_eq!(parse_string_list(r#"["a","b"]"#), vec!["a", "b"]);
        assert_eq!(parse_string_list("not json"), Vec::<String>::new());
    }
}
