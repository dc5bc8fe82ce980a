//! one-mcp - MCP gateway library
//!
//! This library implements a gateway that aggregates multiple upstream
//! Model Context Protocol (MCP) servers behind a single MCP endpoint.
//! Downstream clients connect over SSE and see one virtual server whose
//! tool catalog is the union of every upstream's catalog; tool
//! invocations are routed to the originating upstream.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `mcp`: JSON-RPC wire types, pluggable upstream transports (sse,
//!   stdio, http wrapper), and the per-upstream client with its connect
//!   loop and request correlation
//! - `gateway`: method dispatch, parallel tool-list aggregation, tool
//!   namespace rewriting, and permission evaluation
//! - `session`: downstream session registry with bounded outbound queues
//! - `server`: the axum HTTP surface (SSE stream, message ingress, admin
//!   boundary)
//! - `storage`: the embedded store for upstream servers and API keys
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`: command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use one_mcp::gateway::Gateway;
//! use one_mcp::storage::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::new(std::path::Path::new("data"))?;
//!     let gateway = Arc::new(Gateway::new());
//!     gateway.reload(store.list_enabled_servers()?).await;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod mcp;
pub mod server;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use error::{OneMcpError, Result};
pub use gateway::{Gateway, PermissionSet};
pub use session::{Session, SessionManager};
pub use storage::SqliteStore;
