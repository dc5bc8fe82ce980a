//! Per-session permission evaluation
//!
//! An API key carries exactly one effective permission encoding:
//!
//! 1. A non-empty `allowed_tools` list is authoritative. It either
//!    contains `"*"` (every tool) or is an exact-membership list of
//!    prefixed tool names; `allowed_servers` is ignored entirely.
//! 2. Otherwise `allowed_servers` applies: an exact-membership list of
//!    decimal upstream ids, where the empty list means allow all.
//!
//! A key whose `allowed_tools` was stored as a literal empty list behaves
//! as if the field were unset and falls through to rule 2.

use crate::storage::types::ApiKey;

/// The resolved permission snapshot of one downstream session.
///
/// Snapshotted at SSE connect time; key changes apply to new sessions
/// only.
#[derive(Debug, Clone, Default)]
pub struct PermissionSet {
    /// Prefixed tool names, or `["*"]`; authoritative when non-empty.
    pub allowed_tools: Vec<String>,
    /// Decimal upstream ids; empty means allow all.
    pub allowed_servers: Vec<String>,
}

impl PermissionSet {
    /// Build a snapshot from explicit lists.
    pub fn new(allowed_tools: Vec<String>, allowed_servers: Vec<String>) -> Self {
        Self {
            allowed_tools,
            allowed_servers,
        }
    }

    /// A snapshot that allows everything (admin aggregation).
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Snapshot the permission encodings of an API key.
    pub fn from_api_key(key: &ApiKey) -> Self {
        Self {
            allowed_tools: key.allowed_tools.clone(),
            allowed_servers: key.allowed_servers.clone(),
        }
    }

    /// Whether this session may use `prefixed_tool` on upstream
    /// `server_id`.
    pub fn allows(&self, server_id: i64, prefixed_tool: &str) -> bool {
        if !self.allowed_tools.is_empty() {
            return self
                .allowed_tools
                .iter()
                .any(|t| t == "*" || t == prefixed_tool);
        }

        if self.allowed_servers.is_empty() {
            return true;
        }

        let id = server_id.to_string();
        self.allowed_servers.iter().any(|s| *s == id)
    }
}
