//! In-process credential store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::CredentialStore;
use crate::types::{Client, RevocationRecord, TokenRecord};
use crate::{AuthError, AuthResult};

/// A [`CredentialStore`] kept in memory.
///
/// Selected with `storage.backend = "memory"`. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    clients: RwLock<HashMap<String, Client>>,
    tokens: RwLock<HashMap<String, TokenRecord>>,
    closed: AtomicBool,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a client.
    pub fn insert_client(&self, client: Client) {
        self.clients.write().insert(client.client_id.clone(), client);
    }

    /// Returns a stored token record.
    #[must_use]
    pub fn token(&self, token_id: &str) -> Option<TokenRecord> {
        self.tokens.read().get(token_id).cloned()
    }

    /// Returns the number of stored token records.
    #[must_use]
    pub fn token_count(&self) -> usize {
        self.tokens.read().len()
    }

    /// Returns `true` once [`CredentialStore::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> AuthResult<()> {
        if self.is_closed() {
            return Err(AuthError::storage("memory store is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_client(&self, client_id: &str) -> AuthResult<Option<Client>> {
        self.ensure_open()?;
        Ok(self.clients.read().get(client_id).cloned())
    }

    async fn insert_token(&self, record: &TokenRecord) -> AuthResult<()> {
        self.ensure_open()?;
        self.tokens
            .write()
            .entry(record.token_id.clone())
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn insert_tokens(&self, records: &[TokenRecord]) -> AuthResult<()> {
        self.ensure_open()?;
        let mut tokens = self.tokens.write();
        for record in records {
            tokens
                .entry(record.token_id.clone())
                .or_insert_with(|| record.clone());
        }
        Ok(())
    }

    async fn revoke_token(&self, revocation: &RevocationRecord) -> AuthResult<()> {
        self.ensure_open()?;
        let mut tokens = self.tokens.write();
        let record = tokens
            .entry(revocation.token_id.clone())
            .or_insert_with(|| revocation.to_token_record());
        record.revoked = true;
        record.revoked_at.get_or_insert(revocation.revoked_at);
        Ok(())
    }

    async fn is_revoked(&self, token_id: &str) -> AuthResult<bool> {
        self.ensure_open()?;
        Ok(self
            .tokens
            .read()
            .get(token_id)
            .is_some_and(|record| record.revoked))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use time::OffsetDateTime;

    fn record(id: &str) -> TokenRecord {
        let now = OffsetDateTime::UNIX_EPOCH;
        TokenRecord::new(id, "svc", now, now + Duration::from_secs(60))
    }

    fn revocation(id: &str, at_secs: u64) -> RevocationRecord {
        let now = OffsetDateTime::UNIX_EPOCH;
        RevocationRecord {
            client_id: "svc".into(),
            token_id: id.into(),
            issued_at: now,
            expires_at: now + Duration::from_secs(60),
            revoked_at: now + Duration::from_secs(at_secs),
        }
    }

    #[tokio::test]
    async fn test_unknown_token_is_not_revoked() {
        let store = MemoryCredentialStore::new();
        assert!(!store.is_revoked("nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent_and_keeps_first_instant() {
        let store = MemoryCredentialStore::new();
        store.insert_token(&record("t1")).await.unwrap();

        store.revoke_token(&revocation("t1", 5)).await.unwrap();
        store.revoke_token(&revocation("t1", 9)).await.unwrap();

        let stored = store.token("t1").unwrap();
        assert!(stored.revoked);
        assert_eq!(
            stored.revoked_at,
            Some(OffsetDateTime::UNIX_EPOCH + Duration::from_secs(5))
        );
        assert_eq!(store.token_count(), 1);
    }

    #[tokio::test]
    async fn test_batch_insert_does_not_clear_revocation() {
        let store = MemoryCredentialStore::new();
        store.revoke_token(&revocation("t1", 1)).await.unwrap();

        store
            .insert_tokens(&[record("t1"), record("t2")])
            .await
            .unwrap();

        assert!(store.is_revoked("t1").await.unwrap());
        assert!(!store.is_revoked("t2").await.unwrap());
        assert_eq!(store.token_count(), 2);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_calls() {
        let store = MemoryCredentialStore::new();
        store.close().await;
        assert!(store.is_closed());
        assert!(store.find_client("svc").await.is_err());
        assert!(store.insert_tokens(&[record("t1")]).await.is_err());
    }
}
