//! Storage capability for clients, token metadata and revocations.
//!
//! The core only depends on [`CredentialStore`]. Backends:
//!
//! - [`MemoryCredentialStore`] - in-process, for development and tests
//! - `tollgate-auth-postgres` - PostgreSQL
//!
//! Callers reach the store through [`DeadlineStore`], which bounds every call
//! by a timeout and by the server's shutdown signal.

pub mod deadline;
pub mod memory;

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::{Client, RevocationRecord, TokenRecord};

pub use deadline::{DeadlineStore, StorageTimeouts};
pub use memory::MemoryCredentialStore;

/// Durable store of clients, issued token metadata and revocations.
///
/// # Implementations
///
/// - [`MemoryCredentialStore`] in this crate
/// - `PostgresCredentialStore` in `tollgate-auth-postgres`
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Looks up a client by identifier.
    ///
    /// Returns `Ok(None)` for an unknown client.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_client(&self, client_id: &str) -> AuthResult<Option<Client>>;

    /// Persists one token record.
    ///
    /// A record whose identifier already exists is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn insert_token(&self, record: &TokenRecord) -> AuthResult<()>;

    /// Persists a batch of token records in a single transaction.
    ///
    /// Either every record is written or none is. Records whose identifier
    /// already exists are skipped, so a revocation recorded before the batch
    /// landed is preserved.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails; nothing is written then.
    async fn insert_tokens(&self, records: &[TokenRecord]) -> AuthResult<()>;

    /// Marks a token as revoked.
    ///
    /// Idempotent: revoking an already-revoked token succeeds and keeps the
    /// first revocation instant. A token whose metadata has not been stored
    /// yet is inserted as revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn revoke_token(&self, revocation: &RevocationRecord) -> AuthResult<()>;

    /// Returns `true` if the token has been revoked.
    ///
    /// A token this store has never seen is not revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn is_revoked(&self, token_id: &str) -> AuthResult<bool>;

    /// Releases connections. Calls after `close` fail.
    async fn close(&self);

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}
