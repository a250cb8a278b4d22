//! Simple Vault Library
//!
//! Owner-scoped secret storage over HTTP.
//!
//! # Features
//!
//! - **Session access**: bearer tokens validated by an external auth service,
//!   usernames resolved to stable owner ids through the user directory
//! - **Access-key access**: machine clients fetch one secret by name with an
//!   access-key/secret-key pair
//! - **Owner isolation**: every read, update and delete filters on the owner id
//! - **Pluggable store**: `MongoDB` in production, in-memory for tests and local runs

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod deadline;
pub mod error;
pub mod store;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    }
    .map_err(|e| Error::Internal(format!("failed to install tracing subscriber: {e}")))
}
