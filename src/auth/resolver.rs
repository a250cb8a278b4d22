//! Username → owner identifier resolution.
//!
//! Token validation yields only a username, but secrets are keyed by the
//! user's stable directory identifier (an `ObjectId`, canonicalised as 24
//! hex chars). The user directory is owned by another system; this module
//! only reads it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::{Document, doc, oid::ObjectId};
use dashmap::DashMap;
use tracing::debug;

use crate::deadline::Deadline;
use crate::{Error, Result};

/// Read-only view of the external user directory.
#[async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    /// Fetch the raw directory entry for an exact username match.
    async fn find_by_username(&self, username: &str) -> Result<Option<Document>>;

    /// Liveness probe.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Resolves validated usernames to owner identifiers.
pub struct IdentityResolver {
    directory: Arc<dyn UserDirectory>,
    lookup_timeout: Duration,
}

impl IdentityResolver {
    /// Create a resolver over `directory`; each lookup gets at most `lookup_timeout`.
    #[must_use]
    pub fn new(directory: Arc<dyn UserDirectory>, lookup_timeout: Duration) -> Self {
        Self {
            directory,
            lookup_timeout,
        }
    }

    /// Look up `username` and return its identifier as lowercase hex.
    ///
    /// Fails with [`Error::NotFound`] when no entry exists and with
    /// [`Error::Inconsistent`] when the entry's `_id` is not an `ObjectId`.
    pub async fn resolve_owner_id(&self, username: &str, deadline: &Deadline) -> Result<String> {
        let entry = deadline
            .run(
                "user directory lookup",
                self.lookup_timeout,
                self.directory.find_by_username(username),
            )
            .await?
            .ok_or_else(|| Error::NotFound(format!("User not found: {username}")))?;

        let id = entry
            .get_object_id("_id")
            .map_err(|_| Error::Inconsistent("Invalid user ID format".to_string()))?;

        debug!(username = %username, owner = %id, "Resolved owner id");
        Ok(id.to_hex())
    }
}

/// In-memory user directory keyed by username.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    entries: DashMap<String, Document>,
}

impl InMemoryUserDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from `username → 24-hex id` pairs.
    pub fn from_seed(seed: &HashMap<String, String>) -> Result<Self> {
        let directory = Self::new();
        for (username, hex) in seed {
            let id = ObjectId::parse_str(hex).map_err(|e| {
                Error::Config(format!("seed user '{username}' has invalid id '{hex}': {e}"))
            })?;
            directory.add_user(username, id);
        }
        Ok(directory)
    }

    /// Register a user with an `ObjectId` identifier.
    pub fn add_user(&self, username: &str, id: ObjectId) {
        self.insert_raw(username, doc! { "_id": id, "username": username });
    }

    /// Register an arbitrary entry (used to model malformed directory rows).
    pub fn insert_raw(&self, username: &str, entry: Document) {
        self.entries.insert(username.to_string(), entry);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<Document>> {
        Ok(self.entries.get(username).map(|e| e.value().clone()))
    }
}
