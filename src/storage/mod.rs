//! Embedded store for upstream servers, API keys, and admins
//!
//! A small rusqlite-backed store, one connection per operation. Three
//! relations are maintained: `upstream_servers` and `api_keys` (both
//! soft-deleted via a `deleted_at` marker) and `admins` (schema only; the
//! admin authentication flow lives outside this crate).
//!
//! The gateway core reads enabled upstream servers at reload time and
//! looks up API keys by exact `key` on every SSE connect. The write
//! operations exist for the admin boundary.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{OneMcpError, Result};

pub mod types;

pub use types::{ApiKey, HttpToolConfig, TransportKind, UpstreamServer};

use types::parse_string_list;

/// Database file name inside the data directory.
const DB_FILE: &str = "one-mcp.db";

/// Store backend for gateway configuration state.
pub struct SqliteStore {
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (and initialize) the store under `data_dir`.
    ///
    /// The directory is created when missing.
    ///
    /// # Errors
    ///
    /// Returns [`OneMcpError::Storage`] when the directory or database
    /// cannot be created.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .context("Failed to create data directory")
            .map_err(|e| OneMcpError::Storage(e.to_string()))?;
        Self::new_with_path(data_dir.join(DB_FILE))
    }

    /// Open (and initialize) the store at an explicit database path.
    ///
    /// Primarily useful for tests pointing at a temporary directory.
    ///
    /// # Examples
    ///
    /// ```
    /// use one_mcp::storage::SqliteStore;
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = SqliteStore::new_with_path(dir.path().join("test.db")).unwrap();
    /// assert!(store.list_servers().unwrap().is_empty());
    /// ```
    pub fn new_with_path<P: Into<PathBuf>>(db_path: P) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create parent directory for database")
                .map_err(|e| OneMcpError::Storage(e.to_string()))?;
        }
        let store = Self { db_path };
        store.init()?;
        Ok(store)
    }

    fn conn(&self) -> Result<Connection> {
        Connection::open(&self.db_path)
            .context("Failed to open database")
            .map_err(|e| OneMcpError::Storage(e.to_string()).into())
    }

    /// Initialize the database schema.
    fn init(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS upstream_servers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                transport_type TEXT NOT NULL,
                url TEXT,
                auth_token TEXT,
                command TEXT,
                args TEXT NOT NULL DEFAULT '[]',
                env TEXT NOT NULL DEFAULT '{}',
                tool_config TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE TABLE IF NOT EXISTS api_keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                allowed_tools TEXT NOT NULL DEFAULT '[]',
                allowed_servers TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                deleted_at TEXT
            );
            CREATE TABLE IF NOT EXISTS admins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        )
        .context("Failed to create tables")
        .map_err(|e| OneMcpError::Storage(e.to_string()))?;

        Ok(())
    }

    // -----------------------------------------------------------------
    // upstream_servers
    // -----------------------------------------------------------------

    /// All non-deleted servers.
    pub fn list_servers(&self) -> Result<Vec<UpstreamServer>> {
        self.query_servers("SELECT id, name, transport_type, url, auth_token, command, args, env, tool_config, enabled FROM upstream_servers WHERE deleted_at IS NULL ORDER BY id")
    }

    /// Non-deleted servers with `enabled = 1`; the set the gateway starts.
    pub fn list_enabled_servers(&self) -> Result<Vec<UpstreamServer>> {
        self.query_servers("SELECT id, name, transport_type, url, auth_token, command, args, env, tool_config, enabled FROM upstream_servers WHERE deleted_at IS NULL AND enabled = 1 ORDER BY id")
    }

    fn query_servers(&self, sql: &str) -> Result<Vec<UpstreamServer>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| OneMcpError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map([], row_to_server)
            .map_err(|e| OneMcpError::Storage(e.to_string()))?;

        let mut servers = Vec::new();
        for row in rows {
            servers.push(row.map_err(|e| OneMcpError::Storage(e.to_string()))?);
        }
        Ok(servers)
    }

    /// Persist a new server config; returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`OneMcpError::Validation`] when the config fails
    /// validation or the name collides with a non-deleted server.
    pub fn create_server(&self, server: &UpstreamServer) -> Result<i64> {
        server.validate()?;
        self.ensure_name_free(&server.name, None)?;

        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO upstream_servers
                (name, transport_type, url, auth_token, command, args, env, tool_config, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                server.name,
                server.transport.as_str(),
                server.url,
                server.auth_token,
                server.command,
                serde_json::to_string(&server.args)?,
                serde_json::to_string(&server.env)?,
                server
                    .tool_config
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                server.enabled,
                now,
            ],
        )
        .map_err(|e| OneMcpError::Storage(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    /// Update an existing server config in place.
    pub fn update_server(&self, server: &UpstreamServer) -> Result<()> {
        server.validate()?;
        self.ensure_name_free(&server.name, Some(server.id))?;

        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let changed = conn
            .execute(
                "UPDATE upstream_servers SET
                    name = ?1, transport_type = ?2, url = ?3, auth_token = ?4, command = ?5,
                    args = ?6, env = ?7, tool_config = ?8, enabled = ?9, updated_at = ?10
                 WHERE id = ?11 AND deleted_at IS NULL",
                params![
                    server.name,
                    server.transport.as_str(),
                    server.url,
                    server.auth_token,
                    server.command,
                    serde_json::to_string(&server.args)?,
                    serde_json::to_string(&server.env)?,
                    server
                        .tool_config
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()?,
                    server.enabled,
                    now,
                    server.id,
                ],
            )
            .map_err(|e| OneMcpError::Storage(e.to_string()))?;

        if changed == 0 {
            return Err(OneMcpError::ServerNotFound(server.name.clone()).into());
        }
        Ok(())
    }

    /// Soft-delete a server config.
    pub fn delete_server(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE upstream_servers SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![now, id],
        )
        .map_err(|e| OneMcpError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Reject a name already used by a different non-deleted server.
    fn ensure_name_free(&self, name: &str, exclude_id: Option<i64>) -> Result<()> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM upstream_servers
                 WHERE name = ?1 AND deleted_at IS NULL AND id != ?2",
                params![name, exclude_id.unwrap_or(-1)],
                |row| row.get(0),
            )
            .map_err(|e| OneMcpError::Storage(e.to_string()))?;

        if count > 0 {
            return Err(
                OneMcpError::Validation(format!("server name already in use: {name}")).into(),
            );
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // api_keys
    // -----------------------------------------------------------------

    /// Exact-match lookup of a non-deleted API key by its bearer string.
    pub fn find_api_key(&self, key: &str) -> Result<Option<ApiKey>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, key, description, allowed_tools, allowed_servers
             FROM api_keys WHERE key = ?1 AND deleted_at IS NULL",
            params![key],
            row_to_api_key,
        )
        .optional()
        .map_err(|e| OneMcpError::Storage(e.to_string()).into())
    }

    /// All non-deleted API keys.
    pub fn list_api_keys(&self) -> Result<Vec<ApiKey>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, key, description, allowed_tools, allowed_servers
                 FROM api_keys WHERE deleted_at IS NULL ORDER BY id",
            )
            .map_err(|e| OneMcpError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map([], row_to_api_key)
            .map_err(|e| OneMcpError::Storage(e.to_string()))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row.map_err(|e| OneMcpError::Storage(e.to_string()))?);
        }
        Ok(keys)
    }

    /// Persist a new API key; returns its id.
    pub fn create_api_key(&self, key: &ApiKey) -> Result<i64> {
        if key.key.trim().is_empty() {
            return Err(OneMcpError::Validation("api key must not be empty".to_string()).into());
        }

        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO api_keys (key, description, allowed_tools, allowed_servers, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                key.key,
                key.description,
                serde_json::to_string(&key.allowed_tools)?,
                serde_json::to_string(&key.allowed_servers)?,
                now,
            ],
        )
        .map_err(|e| OneMcpError::Storage(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    /// Soft-delete an API key.
    pub fn delete_api_key(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE api_keys SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![now, id],
        )
        .map_err(|e| OneMcpError::Storage(e.to_string()))?;
        Ok(())
    }
}

/// Map a server row to its materialized type.
fn row_to_server(row: &rusqlite::Row<'_>) -> rusqlite::Result<UpstreamServer> {
    let transport_raw: String = row.get(2)?;
    let args_raw: String = row.get(6)?;
    let env_raw: String = row.get(7)?;
    let tool_config_raw: Option<String> = row.get(8)?;

    Ok(UpstreamServer {
        id: row.get(0)?,
        name: row.get(1)?,
        transport: TransportKind::parse(&transport_raw).unwrap_or(TransportKind::Sse),
        url: row.get(3)?,
        auth_token: row.get(4)?,
        command: row.get(5)?,
        args: parse_string_list(&args_raw),
        env: serde_json::from_str(&env_raw).unwrap_or_default(),
        tool_config: tool_config_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
        enabled: row.get(9)?,
    })
}

/// Map an API-key row to its materialized type.
fn row_to_api_key(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApiKey> {
    let tools_raw: String = row.get(3)?;
    let servers_raw: String = row.get(4)?;
    Ok(ApiKey {
        id: row.get(0)?,
        key: row.get(1)?,
        description: row.get(2)?,
        allowed_tools: parse_string_list(&tools_raw),
        allowed_servers: parse_string_list(&servers_raw),
    })
}
