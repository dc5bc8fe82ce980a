//! MCP test server binary for integration tests
//!
//! This binary implements a minimal MCP server that communicates over
//! stdin/stdout using newline-delimited JSON (the stdio transport
//! protocol). It is used exclusively by integration tests to exercise the
//! stdio transport and the gateway without a real external MCP server.
//!
//! # Handled Methods
//!
//! - `initialize` -- responds with protocol version `2024-11-05` and
//!   `tools` capabilities.
//! - `notifications/initialized` -- acknowledged silently (no response).
//! - `ping` -- empty-object result.
//! - `tools/list` -- returns two tools, `echo` and `reverse`. When the
//!   environment variable `MCP_TEST_STRICT_PARAMS` is set, a request
//!   without a `params` field is rejected with `-32602` so tests can
//!   exercise the gateway's parameter-shape fallback.
//! - `tools/call` -- `echo` returns the `message` argument verbatim,
//!   `reverse` returns it reversed.
//! - All other methods -- JSON-RPC `-32601 Method not found`.
//!
//! # Usage
//!
//! Reads stdin line by line; each line is one JSON-RPC message. Each
//! response is one line of JSON followed by `\n`.

use std::io::{self, BufRead, Write};

fn main() {
    let strict_params = std::env::var("MCP_TEST_STRICT_PARAMS").is_ok();

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request: serde_json::Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(_) => {
                let response = serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": { "code": -32700, "message": "Parse error" }
                });
                if write_response(&mut out, &response).is_err() {
                    break;
                }
                continue;
            }
        };

        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let id = request
            .get("id")
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        if method == "notifications/initialized" {
            continue;
        }

        let response = match method {
            "initialize" => handle_initialize(&id),
            "ping" => serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": {} }),
            "tools/list" => handle_tools_list(&id, &request, strict_params),
            "tools/call" => handle_tools_call(&id, &request),
            _ => make_error(&id, -32601, &format!("Method not found: {method}")),
        };

        if write_response(&mut out, &response).is_err() {
            break;
        }
    }
}

fn write_response(out: &mut impl Write, response: &serde_json::Value) -> io::Result<()> {
    let serialized = serde_json::to_string(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(out, "{serialized}")?;
    out.flush()
}

/// Respond with a valid `initialize` result for protocol `2024-11-05`.
fn handle_initialize(id: &serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": {} },
            "serverInfo": { "name": "mcp-test-server", "version": "0.1.0" }
        }
    })
}

/// Respond with the fixed two-tool catalog.
///
/// In strict mode a request without `params` is rejected with `-32602`,
/// mimicking upstreams that insist on an explicit (possibly empty) params
/// object.
fn handle_tools_list(
    id: &serde_json::Value,
    request: &serde_json::Value,
    strict_params: bool,
) -> serde_json::Value {
    if strict_params && request.get("params").is_none() {
        return make_error(id, -32602, "Invalid params: params object required");
    }

    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "tools": [
                {
                    "name": "echo",
                    "description": "Echo the message argument back",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "message": { "type": "string", "description": "text to echo" }
                        },
                        "required": ["message"]
                    }
                },
                {
                    "name": "reverse",
                    "description": "Reverse the message argument",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "message": { "type": "string", "description": "text to reverse" }
                        },
                        "required": ["message"]
                    }
                }
            ]
        }
    })
}

/// Execute `echo` or `reverse`.
fn handle_tools_call(id: &serde_json::Value, request: &serde_json::Value) -> serde_json::Value {
    let params = request.get("params").cloned().unwrap_or(serde_json::Value::Null);
    let name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
    let message = params
        .get("arguments")
        .and_then(|a| a.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or("");

    let text = match name {
        "echo" => message.to_string(),
        "reverse" => message.chars().rev().collect(),
        _ => {
            return make_error(id, -32602, &format!("Unknown tool: {name}"));
        }
    };

    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": {
            "content": [{ "type": "text", "text": text }]
        }
    })
}

fn make_error(id: &serde_json::Value, code: i64, message: &str) -> serde_json::Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}
