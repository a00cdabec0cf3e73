//! Timeout and cancellation wrapper around a [`CredentialStore`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::CredentialStore;
use crate::types::{Client, RevocationRecord, TokenRecord};
use crate::{AuthError, AuthResult};

/// Per-call storage deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageTimeouts {
    /// Deadline for single-row operations.
    pub operation: Duration,
    /// Deadline for batched writes.
    pub batch: Duration,
}

impl Default for StorageTimeouts {
    fn default() -> Self {
        Self {
            operation: Duration::from_secs(5),
            batch: Duration::from_secs(10),
        }
    }
}

/// A [`CredentialStore`] handle whose calls are bounded by a deadline and
/// abandoned when the server's root cancellation token fires.
///
/// A missed deadline is reported as [`AuthError::Timeout`]; a cancelled call
/// as [`AuthError::ServiceUnavailable`].
#[derive(Clone)]
pub struct DeadlineStore {
    inner: Arc<dyn CredentialStore>,
    cancel: CancellationToken,
    timeouts: StorageTimeouts,
}

impl DeadlineStore {
    /// Wraps `inner`. Every call is cancelled once `cancel` fires.
    #[must_use]
    pub fn new(
        inner: Arc<dyn CredentialStore>,
        cancel: CancellationToken,
        timeouts: StorageTimeouts,
    ) -> Self {
        Self {
            inner,
            cancel,
            timeouts,
        }
    }

    /// Returns the configured deadlines.
    #[must_use]
    pub fn timeouts(&self) -> StorageTimeouts {
        self.timeouts
    }

    /// Returns the wrapped store's backend name.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    /// See [`CredentialStore::find_client`].
    pub async fn find_client(&self, client_id: &str) -> AuthResult<Option<Client>> {
        self.bounded(
            "find_client",
            self.timeouts.operation,
            self.inner.find_client(client_id),
        )
        .await
    }

    /// See [`CredentialStore::insert_token`].
    pub async fn insert_token(&self, record: &TokenRecord) -> AuthResult<()> {
        self.bounded(
            "insert_token",
            self.timeouts.operation,
            self.inner.insert_token(record),
        )
        .await
    }

    /// See [`CredentialStore::insert_tokens`]. Uses the batch deadline.
    pub async fn insert_tokens(&self, records: &[TokenRecord]) -> AuthResult<()> {
        self.bounded(
            "insert_tokens",
            self.timeouts.batch,
            self.inner.insert_tokens(records),
        )
        .await
    }

    /// See [`CredentialStore::revoke_token`].
    pub async fn revoke_token(&self, revocation: &RevocationRecord) -> AuthResult<()> {
        self.bounded(
            "revoke_token",
            self.timeouts.operation,
            self.inner.revoke_token(revocation),
        )
        .await
    }

    /// See [`CredentialStore::is_revoked`].
    pub async fn is_revoked(&self, token_id: &str) -> AuthResult<bool> {
        self.bounded(
            "is_revoked",
            self.timeouts.operation,
            self.inner.is_revoked(token_id),
        )
        .await
    }

    /// Closes the wrapped store, giving up after the operation deadline.
    pub async fn close(&self) {
        if tokio::time::timeout(self.timeouts.operation, self.inner.close())
            .await
            .is_err()
        {
            tracing::warn!(
                backend = self.inner.backend_name(),
                "Storage close timed out"
            );
        }
    }

    async fn bounded<T, F>(&self, operation: &'static str, limit: Duration, call: F) -> AuthResult<T>
    where
        F: Future<Output = AuthResult<T>>,
    {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                Err(AuthError::service_unavailable(format!("{operation} cancelled: shutting down")))
            }
            result = tokio::time::timeout(limit, call) => match result {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(operation, timeout_ms = limit.as_millis() as u64, "Storage call timed out");
                    Err(AuthError::timeout(operation))
                }
            },
        }
    }
}

impl std::fmt::Debug for DeadlineStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadlineStore")
            .field("backend", &self.inner.backend_name())
            .field("timeouts", &self.timeouts)
            .finish()
    }
}
