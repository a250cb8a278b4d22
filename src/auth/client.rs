//! Client for the external authentication service.
//!
//! Two calls, one outbound request each, no retries:
//!
//! | Call | Endpoint | Yields |
//! |------|----------|--------|
//! | [`AuthClient::validate_token`] | `POST /validate` | username |
//! | [`AuthClient::validate_access_key`] | `POST /auth/apikey` | owner id + profile |
//!
//! Failure mapping: a 4xx answer or `valid: false` means the credential was
//! rejected ([`Error::Unauthorized`]); transport errors, timeouts, 5xx and
//! undecodable bodies are [`Error::Upstream`]; a success answer missing a
//! field it must carry is [`Error::Inconsistent`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::config::AuthServiceConfig;
use crate::{Error, Result};

/// Identity returned by a successful access-key validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKeyIdentity {
    /// Stable owner identifier (no directory lookup needed)
    pub owner_id: String,
    /// Username of the key's owner
    pub username: String,
    /// Email of the key's owner
    pub email: String,
}

/// Credential validation against the authentication service.
///
/// Implementations must be `Send + Sync` because a single client is shared
/// by every request handler.
#[async_trait]
pub trait AuthClient: Send + Sync + 'static {
    /// Validate a bearer token (with or without the `Bearer ` prefix) and
    /// return the username it belongs to.
    async fn validate_token(&self, token: &str) -> Result<String>;

    /// Validate an access-key / secret-key pair.
    async fn validate_access_key(
        &self,
        access_key: &str,
        secret_key: &str,
    ) -> Result<AccessKeyIdentity>;
}

#[derive(Debug, Serialize)]
struct TokenValidationRequest<'a> {
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenValidationResponse {
    valid: bool,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessKeyRequest<'a> {
    access_key: &'a str,
    secret_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct AccessKeyResponse {
    #[serde(default, rename = "userID")]
    user_id: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
}

/// Remove an optional `Bearer ` scheme prefix.
#[must_use]
pub fn strip_bearer(header: &str) -> &str {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .unwrap_or(header)
        .trim()
}

/// [`AuthClient`] talking HTTP/JSON to the auth service.
pub struct HttpAuthClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthClient {
    /// Build a client with the configured per-call timeout.
    pub fn new(config: &AuthServiceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build auth HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.service_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        debug!(url = %url, "Calling auth service");

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("failed to call auth service {path}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = format!("auth service returned error: {status} - {text}");
            return Err(if status.is_client_error() {
                Error::Unauthorized(detail)
            } else {
                Error::Upstream(detail)
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| Error::Upstream(format!("failed to decode {path} response: {e}")))
    }
}

#[async_trait]
impl AuthClient for HttpAuthClient {
    async fn validate_token(&self, token: &str) -> Result<String> {
        let token = strip_bearer(token);
        if token.is_empty() {
            return Err(Error::Unauthorized("empty bearer token".to_string()));
        }

        let resp: TokenValidationResponse = self
            .post_json("/validate", &TokenValidationRequest { token })
            .await?;

        if !resp.valid {
            return Err(Error::Unauthorized(format!(
                "token validation failed: {}",
                resp.message.unwrap_or_default()
            )));
        }

        match resp.username {
            Some(username) if !username.is_empty() => Ok(username),
            _ => Err(Error::Inconsistent(
                "token validation response missing username".to_string(),
            )),
        }
    }

    async fn validate_access_key(
        &self,
        access_key: &str,
        secret_key: &str,
    ) -> Result<AccessKeyIdentity> {
        let resp: AccessKeyResponse = self
            .post_json(
                "/auth/apikey",
                &AccessKeyRequest {
                    access_key,
                    secret_key,
                },
            )
            .await?;

        if resp.user_id.is_empty() {
            return Err(Error::Inconsistent(
                "User ID not found in auth response".to_string(),
            ));
        }

        Ok(AccessKeyIdentity {
            owner_id: resp.user_id,
            username: resp.username,
            email: resp.email,
        })
    }
}
