//! Authorization gate for session-authenticated routes.
//!
//! ```text
//! Authorization header
//!   -> AuthClient::validate_token      (username)
//!   -> IdentityResolver::resolve_owner_id (owner id)
//!   -> request.extensions: Owner + Deadline
//! ```
//!
//! Any failure along the way becomes the same opaque 401 so callers cannot
//! tell a bad token from an unknown user. The cause is logged. Nothing is
//! cached; every request validates from scratch.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use super::client::AuthClient;
use super::resolver::IdentityResolver;
use crate::deadline::Deadline;
use crate::{Error, Result};

/// Message returned for every gate rejection.
pub const UNAUTHORIZED_USER: &str = "Unauthorized User";

/// Owner identifier of the authenticated caller.
///
/// Inserted by [`authorization_gate`]; handlers take it as an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

impl Owner {
    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<Owner>()
            .cloned()
            .ok_or_else(|| Error::Unauthorized("User ID not found in context".to_string()))
    }
}

/// Everything the gate needs to turn a bearer token into an [`Owner`].
pub struct AuthGate {
    client: Arc<dyn AuthClient>,
    resolver: Arc<IdentityResolver>,
    auth_timeout: Duration,
    request_timeout: Duration,
}

impl AuthGate {
    /// Create a gate.
    ///
    /// `auth_timeout` bounds the token validation call, `request_timeout`
    /// is the deadline handed to everything downstream.
    #[must_use]
    pub fn new(
        client: Arc<dyn AuthClient>,
        resolver: Arc<IdentityResolver>,
        auth_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client,
            resolver,
            auth_timeout,
            request_timeout,
        }
    }

    /// Fresh deadline for a request entering the gate.
    #[must_use]
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.request_timeout)
    }

    /// Validate an `Authorization` header value and resolve the caller's owner id.
    pub async fn authorize(&self, header: Option<&str>, deadline: &Deadline) -> Result<Owner> {
        let header = header
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| Error::Unauthorized("Authorization header is required".to_string()))?;

        let username = deadline
            .run(
                "token validation",
                self.auth_timeout,
                self.client.validate_token(header),
            )
            .await?;

        let owner = self.resolver.resolve_owner_id(&username, deadline).await?;
        Ok(Owner(owner))
    }
}

/// Authorization middleware
pub async fn authorization_gate(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let deadline = gate.deadline();
    let header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    match gate.authorize(header.as_deref(), &deadline).await {
        Ok(owner) => {
            debug!(owner = %owner.as_str(), path = %request.uri().path(), "Authenticated request");
            request.extensions_mut().insert(owner);
            request.extensions_mut().insert(deadline);
            next.run(request).await
        }
        Err(e) => {
            warn!(path = %request.uri().path(), error = %e, "Rejected unauthenticated request");
            Error::Unauthorized(UNAUTHORIZED_USER.to_string()).into_response()
        }
    }
}
