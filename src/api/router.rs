//! HTTP router

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, Method, header},
    middleware,
    routing::{get, post},
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    create_secret, delete_secret, get_secret, get_secret_by_access_key, health, list_secrets,
    update_secret,
};
use crate::auth::{AuthGate, UserDirectory, authorization_gate};
use crate::store::SecretAccessor;

/// Preflight cache lifetime (20 days).
const CORS_MAX_AGE: Duration = Duration::from_secs(1_728_000);

/// Shared application state
pub struct AppState {
    /// Secret operations
    pub secrets: Arc<SecretAccessor>,
    /// Session authorization
    pub gate: Arc<AuthGate>,
    /// User directory, probed by `/health`
    pub directory: Arc<dyn UserDirectory>,
    /// Deadline for access-key requests
    pub request_timeout: Duration,
    /// Budget for the health probe
    pub health_timeout: Duration,
    /// Largest accepted request body, in bytes
    pub max_body_size: usize,
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let session_routes = Router::new()
        .route("/api/v1/secrets", get(list_secrets).post(create_secret))
        .route(
            "/api/v1/secrets/{id}",
            get(get_secret).put(update_secret).delete(delete_secret),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.gate),
            authorization_gate,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/secrets/access", post(get_secret_by_access_key))
        .merge(session_routes)
        // Enforced by the body extractor so oversized requests get a JSON 413
        .layer(DefaultBodyLimit::max(state.max_body_size))
        // Outside the gate so preflight never needs a token
        .layer(cors_layer())
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Any origin is echoed back; credentials stay disabled.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::CONTENT_LENGTH,
            header::ACCEPT_ENCODING,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::ORIGIN,
            header::CACHE_CONTROL,
            HeaderName::from_static("x-csrf-token"),
            HeaderName::from_static("x-requested-with"),
        ])
        .max_age(CORS_MAX_AGE)
}
