//! Secret record storage.
//!
//! The [`SecretStore`] trait abstracts over document store backends:
//! [`MongoStore`] for production and [`InMemorySecretStore`] for tests and
//! local development. Every read, replace and delete takes the owner
//! identifier as a mandatory argument and filters on it together with the
//! record id (or name); a record owned by someone else is indistinguishable
//! from one that does not exist.
//!
//! [`SecretAccessor`] layers the request-level operations (validation,
//! identifier generation, timestamps, the update sequence, the access-key
//! lookup) on top of a store.

pub mod accessor;
pub mod memory;
pub mod mongo;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{InMemoryUserDirectory, UserDirectory};
use crate::config::{StoreBackend, StoreConfig};
use crate::{Error, Result};

pub use accessor::SecretAccessor;
pub use memory::InMemorySecretStore;
pub use mongo::MongoStore;

/// A stored secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    /// Opaque unique identifier (UUID v4), generated on create
    pub id: String,
    /// Owner identifier; the only authorization key for this record
    pub owner_id: String,
    /// Lookup name within the owner's scope (not unique)
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Arbitrary key/value payload, stored as submitted
    pub data: BTreeMap<String, String>,
    /// Creation time, never changed afterwards
    pub created_at: DateTime<Utc>,
    /// Time of the last replacement
    pub updated_at: DateTime<Utc>,
}

impl SecretRecord {
    /// New record for `owner` with a fresh id and both timestamps set to now.
    #[must_use]
    pub fn new(owner: &str, fields: SecretFields) -> Self {
        let now = now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner.to_string(),
            name: fields.name,
            description: fields.description,
            data: fields.data,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The caller-controlled part of a record; replaced wholesale on update.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SecretFields {
    /// Required, non-blank
    pub name: String,
    /// Optional, defaults to empty
    #[serde(default)]
    pub description: String,
    /// Required, non-empty
    pub data: BTreeMap<String, String>,
}

impl SecretFields {
    /// Check the required fields are actually filled in.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("name is required".to_string()));
        }
        if self.data.is_empty() {
            return Err(Error::Validation(
                "data is required and must contain at least one entry".to_string(),
            ));
        }
        Ok(())
    }
}

/// Current time at the precision the document store keeps (milliseconds).
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Owner-scoped persistence for secret records.
///
/// Implementations must be `Send + Sync` because a single store is shared
/// across all request handlers.
#[async_trait]
pub trait SecretStore: Send + Sync + 'static {
    /// All records owned by `owner`, in no particular order.
    async fn list(&self, owner: &str) -> Result<Vec<SecretRecord>>;

    /// The record with `id` if it is owned by `owner`.
    async fn find(&self, owner: &str, id: &str) -> Result<Option<SecretRecord>>;

    /// A record named `name` owned by `owner`. When several share the name,
    /// which one is returned is unspecified.
    async fn find_by_name(&self, owner: &str, name: &str) -> Result<Option<SecretRecord>>;

    /// Persist a new record.
    async fn insert(&self, record: &SecretRecord) -> Result<()>;

    /// Overwrite name, description and data of the record matching
    /// `id` + `owner`, and set its `updated_at`.
    ///
    /// Returns `false` if nothing matched.
    async fn replace(
        &self,
        owner: &str,
        id: &str,
        fields: &SecretFields,
        updated_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Delete the record matching `id` + `owner`.
    ///
    /// Returns `false` if nothing matched.
    async fn delete(&self, owner: &str, id: &str) -> Result<bool>;

    /// Liveness probe.
    async fn ping(&self) -> Result<()>;

    /// Create the lookup indexes. Backends without indexes do nothing.
    async fn ensure_indexes(&self) -> Result<()> {
        Ok(())
    }
}

/// The two store handles a running server needs.
pub struct Stores {
    /// Secret records
    pub secrets: Arc<dyn SecretStore>,
    /// User directory (read-only)
    pub directory: Arc<dyn UserDirectory>,
}

/// Open the configured backend.
///
/// For `MongoDB` this connects, pings and creates the lookup indexes; an
/// index failure is logged and does not stop startup.
pub async fn open(config: &StoreConfig) -> Result<Stores> {
    match config.backend {
        StoreBackend::Mongo => {
            let mongo = Arc::new(MongoStore::connect(config).await?);
            if let Err(e) = mongo.ensure_indexes().await {
                warn!(error = %e, "Failed to create indexes");
            }
            Ok(Stores {
                secrets: Arc::clone(&mongo) as Arc<dyn SecretStore>,
                directory: mongo,
            })
        }
        StoreBackend::Memory => {
            warn!(
                seeded_users = config.seed_users.len(),
                "Using in-memory store; secrets are lost on restart"
            );
            Ok(Stores {
                secrets: Arc::new(InMemorySecretStore::new()),
                directory: Arc::new(InMemoryUserDirectory::from_seed(&config.seed_users)?),
            })
        }
    }
}

/// Create the secret indexes and report any failure.
///
/// Unlike [`open`], nothing else is set up and an index error is returned.
/// The in-memory backend has no indexes.
pub async fn build_indexes(config: &StoreConfig) -> Result<()> {
    match config.backend {
        StoreBackend::Mongo => MongoStore::connect(config).await?.ensure_indexes().await,
        StoreBackend::Memory => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn build_indexes_is_a_no_op_in_memory() {
        let config = StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        };
        assert!(build_indexes(&config).await.is_ok());
    }

    #[tokio::test]
    async fn build_indexes_surfaces_connection_failure() {
        // GIVEN: a MongoDB endpoint nothing listens on
        let config = StoreConfig {
            uri: Some("mongodb://127.0.0.1:1/vault".to_string()),
            connect_timeout: Duration::from_millis(200),
            ..StoreConfig::default()
        };

        // WHEN/THEN: the failure is returned, not logged and swallowed
        assert!(matches!(
            build_indexes(&config).await,
            Err(Error::Upstream(_))
        ));
    }

    #[tokio::test]
    async fn open_memory_backend_seeds_directory() {
        let mut config = StoreConfig {
            backend: StoreBackend::Memory,
            ..StoreConfig::default()
        };
        config
            .seed_users
            .insert("alice".to_string(), "64b7f0c2a1b2c3d4e5f60718".to_string());

        let stores = open(&config).await.unwrap();
        assert!(stores.secrets.ping().await.is_ok());
        assert!(stores.directory.ping().await.is_ok());
        assert!(stores.directory.find_by_username("alice").await.unwrap().is_some());
        assert!(stores.directory.find_by_username("bob").await.unwrap().is_none());
    }

    fn fields(name: &str, data: &[(&str, &str)]) -> SecretFields {
        SecretFields {
            name: name.to_string(),
            description: String::new(),
            data: data
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[test]
    fn new_record_has_generated_id_and_equal_timestamps() {
        let record = SecretRecord::new("u1", fields("db-creds", &[("user", "a")]));
        assert!(uuid::Uuid::parse_str(&record.id).is_ok());
        assert_eq!(record.owner_id, "u1");
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn ids_are_unique() {
        let a = SecretRecord::new("u1", fields("a", &[("k", "v")]));
        let b = SecretRecord::new("u1", fields("a", &[("k", "v")]));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn validate_requires_name_and_data() {
        assert!(fields("db", &[("k", "v")]).validate().is_ok());
        assert!(matches!(
            fields("  ", &[("k", "v")]).validate(),
            Err(Error::Validation(_))
        ));
        assert!(matches!(fields("db", &[]).validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn missing_description_defaults_to_empty() {
        let parsed: SecretFields =
            serde_json::from_str(r#"{"name":"db","data":{"k":"v"}}"#).unwrap();
        assert_eq!(parsed.description, "");
    }

    #[test]
    fn missing_data_fails_to_parse() {
        assert!(serde_json::from_str::<SecretFields>(r#"{"name":"db"}"#).is_err());
    }
}
