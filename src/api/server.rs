//! Vault server

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::auth::{AuthClient, AuthGate, HttpAuthClient, IdentityResolver};
use crate::config::Config;
use crate::store::{self, SecretAccessor, Stores};
use crate::{Error, Result};

/// Secret storage HTTP server
pub struct VaultServer {
    config: Config,
    state: Arc<AppState>,
}

impl VaultServer {
    /// Open the configured store and auth client and wire up the state.
    pub async fn new(config: Config) -> Result<Self> {
        let stores = store::open(&config.store).await?;
        let auth: Arc<dyn AuthClient> = Arc::new(HttpAuthClient::new(&config.auth)?);
        Ok(Self::from_parts(config, stores, auth))
    }

    /// Build a server from already-constructed collaborators.
    #[must_use]
    pub fn from_parts(config: Config, stores: Stores, auth: Arc<dyn AuthClient>) -> Self {
        let resolver = Arc::new(IdentityResolver::new(
            Arc::clone(&stores.directory),
            config.store.operation_timeout,
        ));
        let gate = Arc::new(AuthGate::new(
            Arc::clone(&auth),
            resolver,
            config.auth.timeout,
            config.server.request_timeout,
        ));
        let secrets = Arc::new(SecretAccessor::new(
            stores.secrets,
            auth,
            config.store.operation_timeout,
            config.auth.timeout,
        ));

        let state = Arc::new(AppState {
            secrets,
            gate,
            directory: stores.directory,
            request_timeout: config.server.request_timeout,
            health_timeout: config.server.health_timeout,
            max_body_size: config.server.max_body_size,
        });

        Self { config, state }
    }

    /// The router this server serves.
    #[must_use]
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.state))
    }

    /// Bind and serve until SIGINT/SIGTERM.
    ///
    /// In-flight requests get `server.shutdown_timeout` to finish.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("SIMPLE VAULT v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(backend = ?self.config.store.backend, "Secret store");
        info!(url = %self.config.auth.service_url, "Auth service");
        info!("Routes:");
        info!("  GET    /health");
        info!("  POST   /api/v1/secrets/access");
        info!("  GET    /api/v1/secrets");
        info!("  POST   /api/v1/secrets");
        info!("  GET    /api/v1/secrets/{{id}}");
        info!("  PUT    /api/v1/secrets/{{id}}");
        info!("  DELETE /api/v1/secrets/{{id}}");
        info!("============================================================");

        let app = self.router();
        let drain_timeout = self.config.server.shutdown_timeout;
        let signalled = Arc::new(Notify::new());

        let serve = axum::serve(listener, app)
            .with_graceful_shutdown({
                let signalled = Arc::clone(&signalled);
                async move {
                    shutdown_signal().await;
                    signalled.notify_one();
                }
            })
            .into_future();

        tokio::select! {
            result = serve => result.map_err(|e| Error::Internal(e.to_string()))?,
            () = async {
                signalled.notified().await;
                tokio::time::sleep(drain_timeout).await;
            } => {
                warn!(timeout = ?drain_timeout, "In-flight requests did not drain in time");
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
