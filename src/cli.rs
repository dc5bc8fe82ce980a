//! Command-line interface definition for one-mcp
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for running the gateway and validating its
//! configuration.

use clap::{Parser, Subcommand};

/// one-mcp - MCP gateway
///
/// Aggregates multiple upstream MCP servers behind a single MCP endpoint.
/// Downstream clients see one virtual server whose tool catalog is the
/// union of every upstream's catalog.
#[derive(Parser, Debug, Clone)]
#[command(name = "one-mcp")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for one-mcp
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the gateway server
    Serve {
        /// Override the bind host from config
        #[arg(long)]
        host: Option<String>,

        /// Override the bind port from config
        #[arg(long)]
        port: Option<u16>,

        /// Override the data directory (also honored as DATA_DIR)
        #[arg(long, env = "DATA_DIR")]
        data_dir: Option<String>,
    },

    /// Load and validate the configuration, then exit
    Validate,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The serve subcommand parses with and without overrides.
    #[test]
    fn test_parse_serve() {
        let cli = Cli::try_parse_from(["one-mcp", "serve"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { .. }));
        assert_eq!(cli.config, "config/config.yaml");

        let cli = Cli::try_parse_from([
            "one-mcp",
            "--config",
            "other.yaml",
            "serve",
            "--host",
            "127.0.0.1",
            "--port",
            "8080",
        ])
        .unwrap();
        assert_eq!(cli.config, "other.yaml");
        match cli.command {
            Commands::Serve { host, port, .. } => {
                assert_eq!(host.as_deref(), Some("127.0.0.1"));
                assert_eq!(port, Some(8080));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    /// The validate subcommand parses.
    #[test]
    fn test_parse_validate() {
        let cli = Cli::try_parse_from(["one-mcp", "validate"]).unwrap();
        assert!(matches!(cli.command, Commands::Validate));
    }

    /// A missing subcommand is a parse error.
    #[test]
    fn test_missing_subcommand_fails() {
        assert!(Cli::try_parse_from(["one-mcp"]).is_err());
    }
}
