//! Request handlers and their wire types.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{FromRequest, Path, Request, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::warn;

use super::router::AppState;
use crate::auth::Owner;
use crate::deadline::Deadline;
use crate::store::{SecretFields, SecretRecord};
use crate::{Error, Result};

/// JSON body extractor whose rejections use the standard JSON error body
/// instead of axum's plain-text rejection.
///
/// Oversized bodies stay 413 and a missing JSON content type stays 415;
/// everything else (syntax, missing fields, wrong types) is a 400.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(match rejection.status() {
                StatusCode::PAYLOAD_TOO_LARGE => Error::PayloadTooLarge(rejection.body_text()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE => {
                    Error::UnsupportedMediaType(rejection.body_text())
                }
                _ => Error::Validation(rejection.body_text()),
            }),
        }
    }
}

/// A secret as returned to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretResponse {
    /// Record id
    pub id: String,
    /// Owner id
    pub user_id: String,
    /// Lookup name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Key/value payload
    pub data: BTreeMap<String, String>,
    /// RFC3339, seconds precision
    pub created_at: String,
    /// RFC3339, seconds precision
    pub updated_at: String,
}

impl From<SecretRecord> for SecretResponse {
    fn from(r: SecretRecord) -> Self {
        Self {
            created_at: rfc3339(r.created_at),
            updated_at: rfc3339(r.updated_at),
            id: r.id,
            user_id: r.owner_id,
            name: r.name,
            description: r.description,
            data: r.data,
        }
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// List envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretList {
    /// The caller's secrets, in store order
    pub secrets: Vec<SecretResponse>,
}

/// What an access-key caller gets back: no id, owner or timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretSummary {
    /// Lookup name
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Key/value payload
    pub data: BTreeMap<String, String>,
}

impl From<SecretRecord> for SecretSummary {
    fn from(r: SecretRecord) -> Self {
        Self {
            name: r.name,
            description: r.description,
            data: r.data,
        }
    }
}

/// Body of `POST /api/v1/secrets/access`.
///
/// Missing fields decode as empty strings so the accessor can report which
/// one is missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccessKeyRequest {
    /// Public half of the key pair
    pub access_key: String,
    /// Private half of the key pair
    pub secret_key: String,
    /// Name of the secret to fetch
    pub name: String,
}

/// `GET /api/v1/secrets`
pub async fn list_secrets(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Extension(deadline): Extension<Deadline>,
) -> Result<Json<SecretList>> {
    let records = state.secrets.list(owner.as_str(), &deadline).await?;
    Ok(Json(SecretList {
        secrets: records.into_iter().map(SecretResponse::from).collect(),
    }))
}

/// `POST /api/v1/secrets`
pub async fn create_secret(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Extension(deadline): Extension<Deadline>,
    ValidJson(fields): ValidJson<SecretFields>,
) -> Result<(StatusCode, Json<SecretResponse>)> {
    let record = state.secrets.create(owner.as_str(), fields, &deadline).await?;
    Ok((StatusCode::CREATED, Json(record.into())))
}

/// `GET /api/v1/secrets/{id}`
pub async fn get_secret(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Extension(deadline): Extension<Deadline>,
    Path(id): Path<String>,
) -> Result<Json<SecretResponse>> {
    let record = state.secrets.get(owner.as_str(), &id, &deadline).await?;
    Ok(Json(record.into()))
}

/// `PUT /api/v1/secrets/{id}`
pub async fn update_secret(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Extension(deadline): Extension<Deadline>,
    Path(id): Path<String>,
    ValidJson(fields): ValidJson<SecretFields>,
) -> Result<Json<SecretResponse>> {
    let record = state
        .secrets
        .update(owner.as_str(), &id, fields, &deadline)
        .await?;
    Ok(Json(record.into()))
}

/// `DELETE /api/v1/secrets/{id}`
pub async fn delete_secret(
    State(state): State<Arc<AppState>>,
    owner: Owner,
    Extension(deadline): Extension<Deadline>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    state.secrets.delete(owner.as_str(), &id, &deadline).await?;
    Ok(Json(json!({ "message": "Secret deleted successfully" })))
}

/// `POST /api/v1/secrets/access`
///
/// Outside the authorization gate; the key pair is the credential.
pub async fn get_secret_by_access_key(
    State(state): State<Arc<AppState>>,
    ValidJson(request): ValidJson<AccessKeyRequest>,
) -> Result<Json<SecretSummary>> {
    let deadline = Deadline::after(state.request_timeout);
    let record = state
        .secrets
        .get_by_access_key(
            &request.access_key,
            &request.secret_key,
            &request.name,
            &deadline,
        )
        .await?;
    Ok(Json(record.into()))
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let deadline = Deadline::after(state.health_timeout);
    let probe = async {
        state.secrets.store().ping().await?;
        state.directory.ping().await
    };

    match deadline.run("health check", state.health_timeout, probe).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "healthy" }))),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "error": "database connection failed"
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn secret_response_uses_camel_case_and_rfc3339() {
        // GIVEN: a record with a millisecond timestamp
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
            + chrono::Duration::milliseconds(250);
        let record = SecretRecord {
            id: "abc".to_string(),
            owner_id: "u1".to_string(),
            name: "db-creds".to_string(),
            description: String::new(),
            data: BTreeMap::from([("user".to_string(), "a".to_string())]),
            created_at: at,
            updated_at: at,
        };

        // WHEN: serialized
        let value = serde_json::to_value(SecretResponse::from(record)).unwrap();

        // THEN: wire names and second-precision UTC timestamps
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["createdAt"], "2024-05-01T12:30:00Z");
        assert_eq!(value["updatedAt"], "2024-05-01T12:30:00Z");
        assert_eq!(value["data"]["user"], "a");
        assert!(value.get("owner_id").is_none());
    }

    #[test]
    fn summary_hides_identity_fields() {
        let record = SecretRecord::new(
            "u1",
            SecretFields {
                name: "n".to_string(),
                description: "d".to_string(),
                data: BTreeMap::from([("k".to_string(), "v".to_string())]),
            },
        );

        let value = serde_json::to_value(SecretSummary::from(record)).unwrap();
        let mut keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["data", "description", "name"]);
    }

    #[test]
    fn access_key_request_tolerates_missing_fields() {
        let parsed: AccessKeyRequest = serde_json::from_str(r#"{"accessKey":"ak"}"#).unwrap();
        assert_eq!(parsed.access_key, "ak");
        assert!(parsed.secret_key.is_empty());
        assert!(parsed.name.is_empty());
    }
}
