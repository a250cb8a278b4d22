//! In-memory secret store backed by a `DashMap` keyed by record id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{SecretFields, SecretRecord, SecretStore};
use crate::{Error, Result};

/// Process-local [`SecretStore`].
#[derive(Default)]
pub struct InMemorySecretStore {
    records: DashMap<String, SecretRecord>,
}

impl InMemorySecretStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all owners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn list(&self, owner: &str) -> Result<Vec<SecretRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|e| e.value().owner_id == owner)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn find(&self, owner: &str, id: &str) -> Result<Option<SecretRecord>> {
        Ok(self
            .records
            .get(id)
            .filter(|e| e.value().owner_id == owner)
            .map(|e| e.value().clone()))
    }

    async fn find_by_name(&self, owner: &str, name: &str) -> Result<Option<SecretRecord>> {
        // Oldest first so repeated lookups of a duplicated name are stable
        Ok(self
            .records
            .iter()
            .filter(|e| e.value().owner_id == owner && e.value().name == name)
            .map(|e| e.value().clone())
            .min_by_key(|r| r.created_at))
    }

    async fn insert(&self, record: &SecretRecord) -> Result<()> {
        if self.records.contains_key(&record.id) {
            return Err(Error::store(
                "failed to create secret",
                format!("duplicate id {}", record.id),
            ));
        }
        self.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn replace(
        &self,
        owner: &str,
        id: &str,
        fields: &SecretFields,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(mut entry) = self.records.get_mut(id) else {
            return Ok(false);
        };
        if entry.owner_id != owner {
            return Ok(false);
        }

        entry.name.clone_from(&fields.name);
        entry.description.clone_from(&fields.description);
        entry.data.clone_from(&fields.data);
        entry.updated_at = updated_at;
        Ok(true)
    }

    async fn delete(&self, owner: &str, id: &str) -> Result<bool> {
        Ok(self
            .records
            .remove_if(id, |_, record| record.owner_id == owner)
            .is_some())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
