//! Simple Vault - owner-scoped secret storage over HTTP

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use simple_vault::{
    api::VaultServer,
    cli::{Cli, Command},
    config::Config,
    setup_tracing, store,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Some(Command::Indexes) => run_indexes(&cli).await,
        Some(Command::CheckConfig) => run_check_config(&cli),
        Some(Command::Serve) | None => run_server(&cli).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Load the configuration file and apply CLI overrides.
fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config =
        Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host.clone_from(host);
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run_server(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        backend = ?config.store.backend,
        "Starting Simple Vault"
    );

    let server = VaultServer::new(config)
        .await
        .context("Failed to start server")?;
    server.run().await.context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn run_indexes(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    store::build_indexes(&config.store)
        .await
        .context("Failed to create indexes")?;
    println!("Indexes ready");
    Ok(())
}

fn run_check_config(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let yaml = serde_yaml::to_string(&config.redacted()).context("Failed to render configuration")?;
    print!("{yaml}");
    Ok(())
}
