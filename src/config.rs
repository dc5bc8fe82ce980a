//! Configuration management for one-mcp
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from a YAML file and environment variables.
//!
//! Environment overrides (applied after the file is read):
//!
//! - `DATA_DIR` -- directory of the embedded store (default `data`)
//! - `ALLOWED_ORIGINS` -- comma-separated CORS origin allowlist; unset
//!   means permissive (any `Origin` is mirrored)
//! - `WEB_DIST` -- dashboard asset directory served by the peripheral
//!   static file server (default `../web/dist`)

use crate::error::{OneMcpError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Directory holding the embedded store
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// CORS origin allowlist; `None` means permissive
    #[serde(default)]
    pub allowed_origins: Option<Vec<String>>,

    /// Dashboard asset directory (peripheral static file server)
    #[serde(default = "default_web_dist")]
    pub web_dist: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            data_dir: default_data_dir(),
            allowed_origins: None,
            web_dist: default_web_dist(),
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_web_dist() -> String {
    "../web/dist".to_string()
}

impl Config {
    /// Load configuration from `path`, then apply environment overrides.
    ///
    /// A missing file is not an error; defaults apply. A present but
    /// malformed file is.
    ///
    /// # Errors
    ///
    /// Returns [`OneMcpError::Yaml`] when the file exists but cannot be
    /// parsed, or [`OneMcpError::Io`] when it cannot be read.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            let raw = std::fs::read_to_string(path).map_err(OneMcpError::Io)?;
            serde_yaml::from_str(&raw).map_err(OneMcpError::Yaml)?
        } else {
            tracing::debug!(path, "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `DATA_DIR`, `ALLOWED_ORIGINS`, and `WEB_DIST` overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(data_dir) = std::env::var("DATA_DIR") {
            if !data_dir.is_empty() {
                self.data_dir = data_dir;
            }
        }
        if let Ok(origins) = std::env::var("ALLOWED_ORIGINS") {
            if !origins.is_empty() {
                self.allowed_origins = Some(
                    origins
                        .split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect(),
                );
            }
        }
        if let Ok(web_dist) = std::env::var("WEB_DIST") {
            if !web_dist.is_empty() {
                self.web_dist = web_dist;
            }
        }
    }

    /// Validate the loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OneMcpError::Config`] for an empty host, a zero port, or
    /// an empty data directory.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(OneMcpError::Config("server.host must not be empty".to_string()).into());
        }
        if self.server.port == 0 {
            return Err(OneMcpError::Config("server.port must not be 0".to_string()).into());
        }
        if self.data_dir.trim().is_empty() {
            return Err(OneMcpError::Config("data_dir must not be empty".to_string()).into());
        }
        Ok(())
    }

    /// Whether `origin` may be mirrored into the CORS response headers.
    pub fn origin_allowed(&self, origin: &str) -> bool {
        match &self.allowed_origins {
            None => true,
            Some(allowed) => allowed.iter().any(|o| o == origin),
        }
    }

    /// The socket address string the listener binds.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Defaults match the documented environment contract.
    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.data_dir, "data");
        assert_eq!(config.web_dist, "../web/dist");
        assert!(config.allowed_origins.is_none());
        config.validate().unwrap();
    }

    /// A partial YAML file fills the rest from defaults.
    #[test]
    fn test_partial_yaml() {
        let config: Config = serde_yaml::from_str("server:\n  port: 8080\n").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.data_dir, "data");
    }

    /// Validation rejects the degenerate listener values.
    #[test]
    fn test_validate_rejects_bad_listener() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.server.host = "".to_string();
        assert!(config.validate().is_err());
    }

    /// Unset allowlist is permissive; a set allowlist is exact.
    #[test]
    fn test_origin_allowed() {
        let mut config = Config::default();
        assert!(config.origin_allowed("https://anywhere.example"));

        config.allowed_origins = Some(vec!["https://app.example".to_string()]);
        assert!(config.origin_allowed("https://app.example"));
        assert!(!config.origin_allowed("https://evil.example"));
    }

    /// `bind_addr` combines host and port.
    #[test]
    fn test_bind_addr() {
        let config = Config::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
    }
}
