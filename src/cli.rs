//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Simple Vault - owner-scoped secret storage
#[derive(Parser, Debug)]
#[command(name = "simple-vault")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "VAULT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "VAULT_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "VAULT_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "VAULT_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "VAULT_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start the vault server (default)
    Serve,

    /// Connect to the store, create the secret indexes, and exit
    Indexes,

    /// Print the resolved configuration (password redacted) and exit
    CheckConfig,
}
