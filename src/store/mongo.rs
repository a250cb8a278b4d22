//! `MongoDB` backend.
//!
//! One [`MongoStore`] holds the pooled client and both collections: the
//! `secrets` collection this service owns and the `users` collection owned
//! by the identity system (read-only here). It implements both
//! [`SecretStore`] and [`UserDirectory`].
//!
//! Secret documents use `_id` (UUID string), `userId`, `name`,
//! `description`, `data`, `createdAt`, `updatedAt`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bson::{Document, doc};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection, IndexModel,
    options::{ClientOptions, IndexOptions},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{SecretFields, SecretRecord, SecretStore};
use crate::auth::UserDirectory;
use crate::config::StoreConfig;
use crate::{Error, Result};

#[derive(Debug, Serialize, Deserialize)]
struct SecretDocument {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "userId")]
    user_id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    data: BTreeMap<String, String>,
    #[serde(
        rename = "createdAt",
        with = "bson::serde_helpers::chrono_datetime_as_bson_datetime"
    )]
    created_at: DateTime<Utc>,
    #[serde(
        rename = "updatedAt",
        with = "bson::serde_helpers::chrono_datetime_as_bson_datetime"
    )]
    updated_at: DateTime<Utc>,
}

impl From<&SecretRecord> for SecretDocument {
    fn from(r: &SecretRecord) -> Self {
        Self {
            id: r.id.clone(),
            user_id: r.owner_id.clone(),
            name: r.name.clone(),
            description: r.description.clone(),
            data: r.data.clone(),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

impl From<SecretDocument> for SecretRecord {
    fn from(d: SecretDocument) -> Self {
        Self {
            id: d.id,
            owner_id: d.user_id,
            name: d.name,
            description: d.description,
            data: d.data,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

/// `MongoDB`-backed secret store and user directory.
pub struct MongoStore {
    client: Client,
    secrets: Collection<SecretDocument>,
    users: Collection<Document>,
}

impl MongoStore {
    /// Connect, verify the connection with a ping, and bind the collections.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let mut options = ClientOptions::parse(config.connection_uri())
            .await
            .map_err(|e| Error::Config(format!("invalid MongoDB URI: {e}")))?;
        options.connect_timeout = Some(config.connect_timeout);
        options.server_selection_timeout = Some(config.connect_timeout);
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());

        let client = Client::with_options(options)
            .map_err(|e| Error::store("failed to create MongoDB client", e))?;

        let store = Self {
            secrets: client
                .database(&config.database)
                .collection(&config.secrets_collection),
            users: client
                .database(&config.users_database)
                .collection(&config.users_collection),
            client,
        };

        tokio::time::timeout(config.connect_timeout, SecretStore::ping(&store))
            .await
            .map_err(|_| Error::Upstream("MongoDB ping timed out".to_string()))??;

        info!(
            database = %config.database,
            users_database = %config.users_database,
            "MongoDB connected"
        );
        Ok(store)
    }

    fn scoped(owner: &str, id: &str) -> Document {
        doc! { "_id": id, "userId": owner }
    }
}

#[async_trait]
impl SecretStore for MongoStore {
    async fn list(&self, owner: &str) -> Result<Vec<SecretRecord>> {
        let cursor = self
            .secrets
            .find(doc! { "userId": owner })
            .await
            .map_err(|e| Error::store("failed to fetch secrets", e))?;

        let docs: Vec<SecretDocument> = cursor
            .try_collect()
            .await
            .map_err(|e| Error::store("failed to decode secrets", e))?;

        Ok(docs.into_iter().map(SecretRecord::from).collect())
    }

    async fn find(&self, owner: &str, id: &str) -> Result<Option<SecretRecord>> {
        self.secrets
            .find_one(Self::scoped(owner, id))
            .await
            .map(|d| d.map(SecretRecord::from))
            .map_err(|e| Error::store("failed to fetch secret", e))
    }

    async fn find_by_name(&self, owner: &str, name: &str) -> Result<Option<SecretRecord>> {
        self.secrets
            .find_one(doc! { "name": name, "userId": owner })
            .await
            .map(|d| d.map(SecretRecord::from))
            .map_err(|e| Error::store("failed to fetch secret", e))
    }

    async fn insert(&self, record: &SecretRecord) -> Result<()> {
        self.secrets
            .insert_one(SecretDocument::from(record))
            .await
            .map_err(|e| Error::store("failed to create secret", e))?;
        Ok(())
    }

    async fn replace(
        &self,
        owner: &str,
        id: &str,
        fields: &SecretFields,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let data = bson::to_bson(&fields.data)
            .map_err(|e| Error::Internal(format!("failed to encode secret data: {e}")))?;

        let update = doc! {
            "$set": {
                "name": fields.name.as_str(),
                "description": fields.description.as_str(),
                "data": data,
                "updatedAt": bson::DateTime::from_chrono(updated_at),
            }
        };

        let result = self
            .secrets
            .update_one(Self::scoped(owner, id), update)
            .await
            .map_err(|e| Error::store("failed to update secret", e))?;

        Ok(result.matched_count > 0)
    }

    async fn delete(&self, owner: &str, id: &str) -> Result<bool> {
        let result = self
            .secrets
            .delete_one(Self::scoped(owner, id))
            .await
            .map_err(|e| Error::store("failed to delete secret", e))?;

        Ok(result.deleted_count > 0)
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| Error::store("database connection failed", e))?;
        Ok(())
    }

    async fn ensure_indexes(&self) -> Result<()> {
        let non_unique = || IndexOptions::builder().unique(false).build();
        let indexes = vec![
            IndexModel::builder()
                .keys(doc! { "name": 1 })
                .options(non_unique())
                .build(),
            IndexModel::builder()
                .keys(doc! { "userId": 1 })
                .options(non_unique())
                .build(),
            IndexModel::builder()
                .keys(doc! { "userId": 1, "name": 1 })
                .options(non_unique())
                .build(),
        ];

        let created = self
            .secrets
            .create_indexes(indexes)
            .await
            .map_err(|e| Error::store("failed to create indexes", e))?;

        info!(indexes = ?created.index_names, "Secret indexes ready");
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MongoStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Document>> {
        self.users
            .find_one(doc! { "username": username })
            .await
            .map_err(|e| Error::store("failed to look up user", e))
    }

    async fn ping(&self) -> Result<()> {
        SecretStore::ping(self).await
    }
}
