//! Request-level secret operations.
//!
//! | Operation | Filter | Not found when |
//! |-----------|--------|----------------|
//! | [`list`](SecretAccessor::list) | owner | never (empty list) |
//! | [`get`](SecretAccessor::get) | id + owner | no match |
//! | [`create`](SecretAccessor::create) | insert | n/a |
//! | [`update`](SecretAccessor::update) | id + owner | existence check, replace, or re-read finds nothing |
//! | [`delete`](SecretAccessor::delete) | id + owner | nothing deleted |
//! | [`get_by_access_key`](SecretAccessor::get_by_access_key) | name + owner from auth service | no match |
//!
//! Update is an existence check followed by an unconditional replace and a
//! re-read. The three steps are not atomic: a delete landing in between
//! shows up as a zero match count on the replace (or an empty re-read) and
//! is reported as not found.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::{SecretFields, SecretRecord, SecretStore, now};
use crate::auth::AuthClient;
use crate::deadline::Deadline;
use crate::{Error, Result};

const SECRET_NOT_FOUND: &str = "Secret not found";

/// Owner-scoped secret operations over a [`SecretStore`].
pub struct SecretAccessor {
    store: Arc<dyn SecretStore>,
    auth: Arc<dyn AuthClient>,
    store_timeout: Duration,
    auth_timeout: Duration,
}

impl SecretAccessor {
    /// Create an accessor.
    ///
    /// `store_timeout` bounds each store call, `auth_timeout` the access-key
    /// validation call; both are further capped by the request deadline.
    #[must_use]
    pub fn new(
        store: Arc<dyn SecretStore>,
        auth: Arc<dyn AuthClient>,
        store_timeout: Duration,
        auth_timeout: Duration,
    ) -> Self {
        Self {
            store,
            auth,
            store_timeout,
            auth_timeout,
        }
    }

    /// The underlying store (used by the health probe).
    #[must_use]
    pub fn store(&self) -> &Arc<dyn SecretStore> {
        &self.store
    }

    /// All secrets owned by `owner`.
    pub async fn list(&self, owner: &str, deadline: &Deadline) -> Result<Vec<SecretRecord>> {
        let records = deadline
            .run("list secrets", self.store_timeout, self.store.list(owner))
            .await?;
        debug!(owner = %owner, count = records.len(), "Listed secrets");
        Ok(records)
    }

    /// One secret by id, if `owner` owns it.
    pub async fn get(&self, owner: &str, id: &str, deadline: &Deadline) -> Result<SecretRecord> {
        deadline
            .run("fetch secret", self.store_timeout, self.store.find(owner, id))
            .await?
            .ok_or_else(not_found)
    }

    /// Validate and store a new secret for `owner`.
    pub async fn create(
        &self,
        owner: &str,
        fields: SecretFields,
        deadline: &Deadline,
    ) -> Result<SecretRecord> {
        fields.validate()?;
        let record = SecretRecord::new(owner, fields);

        deadline
            .run("create secret", self.store_timeout, self.store.insert(&record))
            .await?;

        info!(owner = %owner, secret_id = %record.id, "Secret created");
        Ok(record)
    }

    /// Replace name, description and data of a secret `owner` owns.
    pub async fn update(
        &self,
        owner: &str,
        id: &str,
        fields: SecretFields,
        deadline: &Deadline,
    ) -> Result<SecretRecord> {
        fields.validate()?;

        let existing = self.get(owner, id, deadline).await?;

        // Never move updated_at backwards, even if the wall clock does
        let updated_at = now().max(existing.updated_at);
        let matched = deadline
            .run(
                "update secret",
                self.store_timeout,
                self.store.replace(owner, id, &fields, updated_at),
            )
            .await?;
        if !matched {
            debug!(owner = %owner, secret_id = %id, "Secret vanished before replace");
            return Err(not_found());
        }

        let updated = self.get(owner, id, deadline).await?;
        info!(owner = %owner, secret_id = %id, "Secret updated");
        Ok(updated)
    }

    /// Delete a secret `owner` owns.
    pub async fn delete(&self, owner: &str, id: &str, deadline: &Deadline) -> Result<()> {
        let deleted = deadline
            .run("delete secret", self.store_timeout, self.store.delete(owner, id))
            .await?;
        if !deleted {
            return Err(not_found());
        }

        info!(owner = %owner, secret_id = %id, "Secret deleted");
        Ok(())
    }

    /// Fetch a secret by name for a caller holding an access-key pair.
    ///
    /// The auth service returns the owner id directly, so no directory
    /// lookup is involved.
    pub async fn get_by_access_key(
        &self,
        access_key: &str,
        secret_key: &str,
        name: &str,
        deadline: &Deadline,
    ) -> Result<SecretRecord> {
        if access_key.is_empty() || secret_key.is_empty() {
            return Err(Error::Validation(
                "Access key and secret key are required".to_string(),
            ));
        }
        if name.is_empty() {
            return Err(Error::Validation("Secret name is required".to_string()));
        }

        let identity = deadline
            .run(
                "access key validation",
                self.auth_timeout,
                self.auth.validate_access_key(access_key, secret_key),
            )
            .await?;
        if identity.owner_id.is_empty() {
            return Err(Error::Inconsistent(
                "User ID not found in auth response".to_string(),
            ));
        }

        let record = deadline
            .run(
                "fetch secret",
                self.store_timeout,
                self.store.find_by_name(&identity.owner_id, name),
            )
            .await?
            .ok_or_else(not_found)?;

        info!(owner = %identity.owner_id, secret_id = %record.id, "Secret read via access key");
        Ok(record)
    }
}

fn not_found() -> Error {
    Error::NotFound(SECRET_NOT_FOUND.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::auth::AccessKeyIdentity;
    use crate::store::InMemorySecretStore;

    struct KeyPairs;

    #[async_trait]
    impl AuthClient for KeyPairs {
        async fn validate_token(&self, _: &str) -> Result<String> {
            Err(Error::Unauthorized("unused".to_string()))
        }

        async fn validate_access_key(&self, ak: &str, sk: &str) -> Result<AccessKeyIdentity> {
            match (ak, sk) {
                ("AK1", "SK1") => Ok(identity("u1")),
                ("AK2", "SK2") => Ok(identity("u2")),
                ("AK-blank", _) => Ok(identity("")),
                _ => Err(Error::Unauthorized("invalid credentials".to_string())),
            }
        }
    }

    fn identity(owner: &str) -> AccessKeyIdentity {
        AccessKeyIdentity {
            owner_id: owner.to_string(),
            username: "someone".to_string(),
            email: "someone@example.com".to_string(),
        }
    }

    /// Deletes the record right before delegating the replace, modelling a
    /// concurrent delete between the existence check and the write.
    struct DeleteBeforeReplace(InMemorySecretStore);

    #[async_trait]
    impl SecretStore for DeleteBeforeReplace {
        async fn list(&self, owner: &str) -> Result<Vec<SecretRecord>> {
            self.0.list(owner).await
        }
        async fn find(&self, owner: &str, id: &str) -> Result<Option<SecretRecord>> {
            self.0.find(owner, id).await
        }
        async fn find_by_name(&self, owner: &str, name: &str) -> Result<Option<SecretRecord>> {
            self.0.find_by_name(owner, name).await
        }
        async fn insert(&self, record: &SecretRecord) -> Result<()> {
            self.0.insert(record).await
        }
        async fn replace(
            &self,
            owner: &str,
            id: &str,
            fields: &SecretFields,
            updated_at: DateTime<Utc>,
        ) -> Result<bool> {
            self.0.delete(owner, id).await?;
            self.0.replace(owner, id, fields, updated_at).await
        }
        async fn delete(&self, owner: &str, id: &str) -> Result<bool> {
            self.0.delete(owner, id).await
        }
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    fn accessor_over(store: Arc<dyn SecretStore>) -> SecretAccessor {
        SecretAccessor::new(
            store,
            Arc::new(KeyPairs),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
    }

    fn accessor() -> SecretAccessor {
        accessor_over(Arc::new(InMemorySecretStore::new()))
    }

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(10))
    }

    fn fields(name: &str, pairs: &[(&str, &str)]) -> SecretFields {
        SecretFields {
            name: name.to_string(),
            description: "desc".to_string(),
            data: pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[tokio::test]
    async fn create_then_get_returns_same_content() {
        let acc = accessor();
        let d = deadline();
        let input = fields("db-creds", &[("user", "a"), ("pass", "b")]);

        let created = acc.create("u1", input.clone(), &d).await.unwrap();
        let fetched = acc.get("u1", &created.id, &d).await.unwrap();

        assert_eq!(fetched.name, input.name);
        assert_eq!(fetched.description, input.description);
        assert_eq!(fetched.data, input.data);
        assert!(!fetched.id.is_empty());
        assert_eq!(fetched.created_at, fetched.updated_at);
    }

    #[tokio::test]
    async fn create_rejects_empty_data() {
        let err = accessor()
            .create("u1", fields("x", &[]), &deadline())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn other_owner_gets_not_found_everywhere() {
        // GIVEN: a secret owned by u1
        let acc = accessor();
        let d = deadline();
        let created = acc.create("u1", fields("a", &[("k", "v")]), &d).await.unwrap();

        // WHEN/THEN: u2 cannot read, update or delete it
        assert!(matches!(acc.get("u2", &created.id, &d).await, Err(Error::NotFound(_))));
        assert!(matches!(
            acc.update("u2", &created.id, fields("b", &[("x", "y")]), &d).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(acc.delete("u2", &created.id, &d).await, Err(Error::NotFound(_))));

        // AND: u1 still sees the original content
        let still = acc.get("u1", &created.id, &d).await.unwrap();
        assert_eq!(still.name, "a");
    }

    #[tokio::test]
    async fn update_is_idempotent_on_content() {
        let acc = accessor();
        let d = deadline();
        let created = acc.create("u1", fields("a", &[("k", "v")]), &d).await.unwrap();
        let body = fields("b", &[("k2", "v2")]);

        let first = acc.update("u1", &created.id, body.clone(), &d).await.unwrap();
        let second = acc.update("u1", &created.id, body.clone(), &d).await.unwrap();

        assert_eq!((&first.name, &first.description, &first.data), (&second.name, &second.description, &second.data));
        assert_eq!(second.data, body.data);
        assert!(second.updated_at >= first.updated_at);
        assert!(first.updated_at >= created.updated_at);
        assert_eq!(second.created_at, created.created_at);
    }

    #[tokio::test]
    async fn update_reports_not_found_when_record_vanishes_mid_update() {
        // GIVEN: a store where the record disappears between check and replace
        let inner = InMemorySecretStore::new();
        let record = SecretRecord::new("u1", fields("a", &[("k", "v")]));
        inner.insert(&record).await.unwrap();
        let acc = accessor_over(Arc::new(DeleteBeforeReplace(inner)));

        // WHEN: updating
        let err = acc
            .update("u1", &record.id, fields("b", &[("k", "v")]), &deadline())
            .await
            .unwrap_err();

        // THEN: the zero match count surfaces as NotFound
        assert!(matches!(err, Error::NotFound(ref m) if m == SECRET_NOT_FOUND));
    }

    #[tokio::test]
    async fn delete_twice_second_is_not_found() {
        let acc = accessor();
        let d = deadline();
        let created = acc.create("u1", fields("a", &[("k", "v")]), &d).await.unwrap();

        acc.delete("u1", &created.id, &d).await.unwrap();
        assert!(matches!(acc.delete("u1", &created.id, &d).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn access_key_lookup_is_owner_scoped() {
        // GIVEN: "shared" exists only for u2, "mine" for u1
        let acc = accessor();
        let d = deadline();
        acc.create("u1", fields("mine", &[("k", "1")]), &d).await.unwrap();
        acc.create("u2", fields("shared", &[("k", "2")]), &d).await.unwrap();

        // THEN: AK1 (u1) finds its own secret
        let found = acc.get_by_access_key("AK1", "SK1", "mine", &d).await.unwrap();
        assert_eq!(found.data.get("k").map(String::as_str), Some("1"));

        // AND: cannot see u2's secret or a missing one
        assert!(matches!(
            acc.get_by_access_key("AK1", "SK1", "shared", &d).await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            acc.get_by_access_key("AK1", "SK1", "nope", &d).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn access_key_failures_map_to_taxonomy() {
        let acc = accessor();
        let d = deadline();

        assert!(matches!(
            acc.get_by_access_key("", "SK1", "x", &d).await,
            Err(Error::Validation(ref m)) if m == "Access key and secret key are required"
        ));
        assert!(matches!(
            acc.get_by_access_key("AK1", "SK1", "", &d).await,
            Err(Error::Validation(ref m)) if m == "Secret name is required"
        ));
        assert!(matches!(
            acc.get_by_access_key("AK1", "wrong", "x", &d).await,
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            acc.get_by_access_key("AK-blank", "any", "x", &d).await,
            Err(Error::Inconsistent(_))
        ));
    }
}
