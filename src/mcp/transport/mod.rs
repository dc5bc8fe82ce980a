//! Upstream transport abstraction and implementations
//!
//! This module defines the [`Transport`] trait that all upstream transport
//! implementations must satisfy. Concrete implementations live in
//! submodules:
//!
//! - [`sse::SseTransport`] -- long-polling GET + POST-back transport for
//!   remote HTTP+SSE MCP servers.
//! - [`stdio::StdioTransport`] -- spawns a child process and communicates
//!   over its stdin/stdout pipes (newline-delimited JSON).
//! - [`http_wrapper::HttpWrapperTransport`] -- synthesizes an MCP server
//!   from a single REST endpoint; no persistent upstream connection.
//! - [`fake::FakeTransport`] -- in-process fake used in tests (cfg(test)
//!   only).
//!
//! # Design
//!
//! The [`Transport`] trait is intentionally minimal: [`Transport::run`]
//! drives the connection until it ends or the cancellation token fires,
//! signalling readiness once per run and delivering each complete inbound
//! JSON-RPC message as one string. [`Transport::send`] writes one
//! serialized message and is valid only after readiness. Framing is the
//! responsibility of each concrete implementation; transports never
//! interpret JSON-RPC (the HTTP wrapper is the deliberate exception -- it
//! *is* the server).
//!
//! Reconnection is NOT a transport concern: the owning
//! [`crate::mcp::upstream::UpstreamClient`] calls `run` again after it
//! returns.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{OneMcpError, Result};

/// Abstraction over upstream transport implementations.
///
/// Implementations exist for SSE, stdio (child process), and the HTTP
/// REST wrapper. A [`fake::FakeTransport`] is provided for tests.
///
/// Transports hold no reference to their owning client; all communication
/// back to the owner flows through the channels passed to [`Transport::run`].
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Drive the connection until it ends or `cancel` fires.
    ///
    /// Sends `()` on `ready_tx` exactly once per run when outbound sending
    /// becomes possible, and one complete JSON-RPC message string per
    /// `inbound_tx` send (no framing bytes, whitespace-trimmed).
    ///
    /// # Arguments
    ///
    /// * `cancel` - Cancelling this token forces `run` to return; the call
    ///   is idempotent.
    /// * `inbound_tx` - Channel for complete inbound messages.
    /// * `ready_tx` - Channel signalled once sending becomes possible.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection terminates abnormally (failed
    /// connect, failed spawn, broken pipe). A clean end-of-stream or a
    /// cancellation returns `Ok(())`.
    async fn run(
        &self,
        cancel: CancellationToken,
        inbound_tx: mpsc::UnboundedSender<String>,
        ready_tx: mpsc::UnboundedSender<()>,
    ) -> Result<()>;

    /// Send a complete JSON-RPC message string to the remote peer.
    ///
    /// May be called only after the current run signalled readiness. Safe
    /// to call concurrently from multiple producers.
    ///
    /// # Errors
    ///
    /// Returns [`OneMcpError::Transport`] if the transport is not ready or
    /// the underlying I/O operation fails.
    async fn send(&self, message: String) -> Result<()>;
}

/// Shell metacharacters forbidden in stdio commands and arguments.
///
/// Any occurrence anywhere in the command or an argument is a validation
/// failure at construction time, before a process is ever spawned.
pub const FORBIDDEN_SHELL_CHARS: &[char] = &[
    ';', '|', '&', '>', '<', '$', '(', ')', '!', '`', '*', '?', '[', ']', '{', '}', '~', '\\',
    '"', '\'', '\n', '\r',
];

/// Validate a stdio command and its arguments against
/// [`FORBIDDEN_SHELL_CHARS`].
///
/// The gateway never passes commands through a shell, but upstream configs
/// arrive from an administrative surface; rejecting metacharacters outright
/// keeps a misconfigured entry from smuggling shell syntax into whatever
/// the spawned binary does with its argv.
///
/// # Errors
///
/// Returns [`OneMcpError::Validation`] naming the offending value when the
/// command or any argument contains a forbidden character, or when the
/// command is empty.
pub fn validate_command(command: &str, args: &[String]) -> Result<()> {
    if command.trim().is_empty() {
        return Err(OneMcpError::Validation("command must not be empty".to_string()).into());
    }

    let check = |what: &str, value: &str| -> Result<()> {
        if let Some(c) = value.chars().find(|c| FORBIDDEN_SHELL_CHARS.contains(c)) {
            return Err(OneMcpError::Validation(format!(
                "{what} contains forbidden character {c:?}: {value}"
            ))
            .into());
        }
        Ok(())
    };

    check("command", command)?;
    for arg in args {
        check("argument", arg)?;
    }
    Ok(())
}

pub mod http_wrapper;
pub mod sse;
pub mod stdio;

#[cfg(test)]
pub mod fake;

#[cfg(test)]
mod tests {
    use super::*;

    /// Plain commands and arguments pass validation.
    #[test]
    fn test_validate_command_accepts_plain_argv() {
        validate_command("npx", &["-y".to_string(), "server-filesystem".to_string()]).unwrap();
        validate_command("/usr/bin/python3", &["-m".to_string(), "mcp_server".to_string()])
            .unwrap();
    }

    /// Every forbidden metacharacter is rejected, in the command and in
    /// any argument.
    #[test]
    fn test_validate_command_rejects_each_metacharacter() {
        for c in FORBIDDEN_SHELL_CHARS {
            let bad = format!("echo{c}");
            assert!(
                validate_command(&bad, &[]).is_err(),
                "command containing {c:?} must be rejected"
            );
            assert!(
                validate_command("echo", &[format!("a{c}b")]).is_err(),
                "argument containing {c:?} must be rejected"
            );
        }
    }

    /// The empty command is rejected before character checks.
    #[test]
    fn test_validate_command_rejects_empty_command() {
        assert!(validate_command("", &[]).is_err());
        assert!(validate_command("   ", &[]).is_err());
    }

    /// An injection-shaped argument is rejected with a Validation error.
    #[test]
    fn test_validate_command_rejects_injection_attempt() {
        let result = validate_command("cat", &["/etc/passwd; rm -rf /".to_string()]);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Validation error"), "got: {err}");
    }
}
