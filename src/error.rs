//! Error types for Simple Vault
//!
//! Every failure a request can hit is one of the tagged variants below.
//! Handlers return `Result<_, Error>` and the [`IntoResponse`] impl turns
//! the variant into an HTTP status plus a JSON body at the boundary.

use std::io;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for Simple Vault
pub type Result<T> = std::result::Result<T, Error>;

/// Simple Vault errors
#[derive(Error, Debug)]
pub enum Error {
    /// Missing, invalid or unverifiable credential
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Record absent, owned by someone else, or user missing from the directory
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed or incomplete request body
    #[error("Validation error: {0}")]
    Validation(String),

    /// Request body over the configured size limit
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Request body is not declared as JSON
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Auth service or document store unreachable, timed out, or misbehaving
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// An authenticated response lacked a field it must carry
    #[error("Internal inconsistency: {0}")]
    Inconsistent(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a store failure with the operation that produced it
    pub fn store(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Upstream(format!("{context}: {err}"))
    }

    /// HTTP status for this error
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Upstream(_)
            | Self::Inconsistent(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code used in the `error` field of responses
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "invalid_request",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::UnsupportedMediaType(_) => "unsupported_media_type",
            Self::Upstream(_) => "upstream_failure",
            Self::Inconsistent(_) => "internal_inconsistency",
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => "internal_error",
        }
    }

    /// Human-readable message without the variant prefix
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Unauthorized(m)
            | Self::NotFound(m)
            | Self::Validation(m)
            | Self::PayloadTooLarge(m)
            | Self::UnsupportedMediaType(m)
            | Self::Upstream(m)
            | Self::Inconsistent(m)
            | Self::Config(m)
            | Self::Internal(m) => m.clone(),
            Self::Io(e) => e.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.code(),
            "message": self.message(),
        }));

        if status == StatusCode::UNAUTHORIZED {
            (status, [("WWW-Authenticate", "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(Error::Unauthorized(String::new()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(Error::NotFound(String::new()).status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::Validation(String::new()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::PayloadTooLarge(String::new()).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            Error::UnsupportedMediaType(String::new()).status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            Error::Upstream(String::new()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::Inconsistent(String::new()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn store_helper_keeps_context() {
        let err = Error::store("failed to fetch secrets", "connection reset");
        assert_eq!(err.message(), "failed to fetch secrets: connection reset");
        assert_eq!(err.code(), "upstream_failure");
    }

    #[test]
    fn unauthorized_response_carries_challenge() {
        let response = Error::Unauthorized("Unauthorized User".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get("WWW-Authenticate").unwrap(),
            "Bearer"
        );
    }
}
