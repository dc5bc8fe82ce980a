//! Stdio transport for child-process MCP servers
//!
//! This module implements [`StdioTransport`], which spawns a child process
//! and communicates with it over its stdin/stdout pipes using
//! newline-delimited JSON framing. This is the standard transport for
//! locally-installed MCP servers.
//!
//! # Protocol
//!
//! - Outbound messages are written to the child's stdin as a single JSON
//!   object followed by a newline (appended when missing).
//! - Inbound messages are read from the child's stdout, one JSON object per
//!   line; `next_line` hands each message over in a fresh buffer.
//! - The child's stderr is drained and logged via `tracing::debug!`. It is
//!   diagnostic only and never delivered as a message.
//!
//! # Lifecycle
//!
//! The command and arguments are validated against
//! [`super::FORBIDDEN_SHELL_CHARS`] at construction; a forbidden character
//! anywhere is a startup failure before any process exists. Each
//! [`Transport::run`] spawns a fresh child and signals readiness
//! immediately after the spawn, before any stdout byte. Cancellation kills
//! the child; dropping the transport sends a best-effort SIGTERM (Unix) or
//! `start_kill` (non-Unix).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::{OneMcpError, Result};
use crate::mcp::transport::{validate_command, Transport};

/// Stdio-based upstream transport that drives a child process.
///
/// # Examples
///
/// ```no_run
/// use std::collections::HashMap;
/// use one_mcp::mcp::transport::stdio::StdioTransport;
///
/// let transport = StdioTransport::new(
///     "npx".to_string(),
///     vec!["-y".to_string(), "@modelcontextprotocol/server-filesystem".to_string()],
///     HashMap::new(),
/// ).unwrap();
/// ```
#[derive(Debug)]
pub struct StdioTransport {
    /// Executable to spawn.
    command: String,
    /// Arguments passed to the executable.
    args: Vec<String>,
    /// Per-upstream environment overlaid on the process environment.
    env: HashMap<String, String>,
    /// Sender feeding the current run's stdin writer task. `None` between
    /// runs.
    stdin_tx: Arc<RwLock<Option<mpsc::UnboundedSender<String>>>>,
    /// Handle to the current child process; used by cancellation and `Drop`.
    child: Arc<Mutex<Option<Child>>>,
}

impl StdioTransport {
    /// Validate the command line and construct the transport.
    ///
    /// No process is spawned here; that happens on every [`Transport::run`].
    ///
    /// # Errors
    ///
    /// Returns [`OneMcpError::Validation`] when the command or any argument
    /// contains a forbidden shell metacharacter or the command is empty.
    pub fn new(command: String, args: Vec<String>, env: HashMap<String, String>) -> Result<Self> {
        validate_command(&command, &args)?;
        Ok(Self {
            command,
            args,
            env,
            stdin_tx: Arc::new(RwLock::new(None)),
            child: Arc::new(Mutex::new(None)),
        })
    }

    /// Kill and reap the current child, if any.
    async fn kill_child(&self) {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
}

#[async_trait::async_trait]
impl Transport for StdioTransport {
    /// Spawn the child and pump its stdout until it exits or `cancel`
    /// fires.
    ///
    /// Readiness is signalled immediately after the spawn succeeds. A
    /// cancellation kills the child and returns `Ok(())`; the child
    /// exiting on its own is reported as an error so the owner applies the
    /// longer reconnect delay.
    ///
    /// # Errors
    ///
    /// Returns [`OneMcpError::Transport`] when the process cannot be
    /// spawned, its pipes are unavailable, or it terminates on its own.
    async fn run(
        &self,
        cancel: CancellationToken,
        inbound_tx: mpsc::UnboundedSender<String>,
        ready_tx: mpsc::UnboundedSender<()>,
    ) -> Result<()> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        // The child sees the gateway's environment with the per-upstream
        // map layered on top.
        cmd.envs(&self.env);

        let mut child = cmd.spawn().map_err(|e| {
            anyhow::anyhow!(OneMcpError::Transport(format!(
                "failed to spawn MCP server `{}`: {e}",
                self.command
            )))
        })?;

        // All three handles are guaranteed present because of Stdio::piped().
        let stdin = child.stdin.take().ok_or_else(|| {
            OneMcpError::Transport("child stdin unavailable after spawn".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            OneMcpError::Transport("child stdout unavailable after spawn".to_string())
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            OneMcpError::Transport("child stderr unavailable after spawn".to_string())
        })?;

        *self.child.lock().await = Some(child);

        // Wire the stdin writer for this run.
        let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<String>();
        *self.stdin_tx.write().await = Some(stdin_tx);

        // Sending is possible as soon as the process exists.
        let _ = ready_tx.send(());

        // Background task: forward stdin_rx -> child stdin, newline-framed.
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(msg) = stdin_rx.recv().await {
                let line = if msg.ends_with('\n') {
                    msg
                } else {
                    format!("{msg}\n")
                };
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
            }
        });

        // Background task: drain child stderr into the log.
        let command_label = self.command.clone();
        tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(command = %command_label, "mcp server stderr: {line}");
            }
        });

        // Main loop: one stdout line is one inbound message.
        let reader = BufReader::new(stdout);
        let mut lines = reader.lines();
        let outcome = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.kill_child().await;
                    break Ok(());
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let _ = inbound_tx.send(line);
                    }
                    Ok(None) => {
                        // stdout closed: the child is gone.
                        self.kill_child().await;
                        break Err(anyhow::anyhow!(OneMcpError::Transport(format!(
                            "MCP server `{}` exited",
                            self.command
                        ))));
                    }
                    Err(e) => {
                        self.kill_child().await;
                        break Err(anyhow::anyhow!(OneMcpError::Transport(format!(
                            "failed reading stdout of `{}`: {e}",
                            self.command
                        ))));
                    }
                }
            }
        };

        // Drop this run's stdin sender so the writer task exits.
        *self.stdin_tx.write().await = None;

        outcome
    }

    /// Write one JSON-RPC message to the child's stdin.
    ///
    /// # Errors
    ///
    /// Returns [`OneMcpError::NotReady`] when no child is running and
    /// [`OneMcpError::Transport`] when the writer task has exited.
    async fn send(&self, message: String) -> Result<()> {
        let guard = self.stdin_tx.read().await;
        let tx = guard.as_ref().ok_or_else(|| {
            OneMcpError::NotReady("stdio transport has no running child".to_string())
        })?;
        tx.send(message).map_err(|e| {
            anyhow::anyhow!(OneMcpError::Transport(format!("stdin channel closed: {e}")))
        })
    }
}

impl Drop for StdioTransport {
    /// Best-effort termination of the child process on drop.
    ///
    /// On Unix, sends SIGTERM to the child PID via `libc::kill`. On
    /// non-Unix platforms, calls `start_kill()` on the child handle. This
    /// method MUST NOT block; it is fire-and-forget.
    fn drop(&mut self) {
        if let Ok(mut guard) = self.child.try_lock() {
            if let Some(child) = guard.as_mut() {
                #[cfg(unix)]
                {
                    if let Some(pid) = child.id() {
                        // SAFETY: pid is a valid process ID obtained from
                        // tokio::process::Child.
                        unsafe {
                            libc::kill(pid as libc::pid_t, libc::SIGTERM);
                        }
                    }
                }
                #[cfg(not(unix))]
                {
                    let _ = child.start_kill();
                }
            }
        }
    }
}
