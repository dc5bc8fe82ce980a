//! MCP (Model Context Protocol) support for the gateway
//!
//! This module holds the upstream half of the gateway: the JSON-RPC wire
//! types, the pluggable transports, and the per-upstream client that keeps
//! a connection alive and correlates requests with responses.
//!
//! The implementation targets protocol revision **2024-11-05** on both the
//! upstream and the downstream side.
//!
//! # Module Layout
//!
//! - `types`     -- JSON-RPC 2.0 primitives, MCP method constants, fixed
//!   capability payloads
//! - `transport` -- `Transport` trait and concrete implementations (sse,
//!   stdio, http wrapper, fake)
//! - `upstream`  -- connect loop, handshake, and request correlation

pub mod transport;
pub mod types;
pub mod upstream;

pub use types::*;
pub use upstream::UpstreamClient;
