//! The credential lifecycle: issue, validate, revoke.
//!
//! A token is live from issue until it expires or is revoked; both are
//! terminal. Expiry needs no bookkeeping. Revocation is recorded in storage
//! and checked on every validation, so it holds across restarts and across
//! instances sharing a database even though the client cache is local.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use super::id::generate_token_id;
use super::jwt::{Claims, JwtService};
use super::secret::verify_client_secret;
use crate::batch::TokenBatchWriter;
use crate::cache::ClientCache;
use crate::clock::Clock;
use crate::config::{AuthConfig, Durability};
use crate::storage::DeadlineStore;
use crate::types::{Client, RevocationRecord, TokenRecord};
use crate::{AuthError, AuthResult};

/// A freshly issued access token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The signed token.
    pub access_token: String,
    /// Token identifier (the `jti` claim).
    pub token_id: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
    /// Expiry instant.
    pub expires_at: OffsetDateTime,
    /// Scopes granted.
    pub scopes: Vec<String>,
}

/// Issues, validates and revokes access tokens.
pub struct CredentialAuthority {
    jwt: JwtService,
    cache: Arc<ClientCache>,
    store: DeadlineStore,
    batch: Arc<TokenBatchWriter>,
    clock: Arc<dyn Clock>,
    default_lifetime: Duration,
    token_id_bytes: usize,
    durability: Durability,
}

impl CredentialAuthority {
    /// Creates an authority over the given collaborators.
    #[must_use]
    pub fn new(
        config: &AuthConfig,
        cache: Arc<ClientCache>,
        store: DeadlineStore,
        batch: Arc<TokenBatchWriter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            jwt: JwtService::new(config.signing.secret.as_bytes(), config.issuer.clone()),
            cache,
            store,
            batch,
            clock,
            default_lifetime: config.token.lifetime,
            token_id_bytes: config.token.id_bytes,
            durability: config.batch.durability,
        }
    }

    /// Authenticates a client and issues a token carrying its allowed scopes.
    ///
    /// # Errors
    ///
    /// - `InvalidClient` for an unknown client or a wrong secret
    /// - `Internal` if signing fails or the client's lifetime overflows the
    ///   representable expiry
    /// - storage errors from the client lookup, or from the metadata write in
    ///   write-through mode
    pub async fn issue(&self, client_id: &str, client_secret: &str) -> AuthResult<IssuedToken> {
        let client = self.resolve_client(client_id).await?;

        if !verify_client_secret(client_secret, &client.client_secret) {
            tracing::info!(client_id, "Client secret mismatch");
            return Err(AuthError::invalid_client("secret mismatch"));
        }

        let lifetime = client.token_lifetime(self.default_lifetime);
        let issued_at = self.clock.now();
        let expires_at = time::Duration::try_from(lifetime)
            .ok()
            .and_then(|d| issued_at.checked_add(d))
            .ok_or_else(|| {
                tracing::error!(
                    client_id,
                    lifetime_secs = lifetime.as_secs(),
                    "Client token lifetime out of range"
                );
                AuthError::internal("client token lifetime out of range")
            })?;
        let token_id = generate_token_id(self.token_id_bytes);
        let scopes = client.allowed_scopes.clone();

        let claims = Claims::new(
            self.jwt.issuer(),
            &client.client_id,
            token_id.clone(),
            scopes.clone(),
            issued_at,
            expires_at,
        );
        let access_token = self.jwt.encode(&claims).map_err(|e| {
            tracing::error!(client_id, error = %e, "Failed to sign token");
            AuthError::from(e)
        })?;

        let record = TokenRecord::new(token_id.clone(), client.client_id.clone(), issued_at, expires_at);
        match self.durability {
            Durability::WriteBehind => self.batch.add(record),
            Durability::WriteThrough => self.store.insert_token(&record).await?,
        }

        tracing::info!(client_id, token_id = %token_id, expires_in = lifetime.as_secs(), "Token issued");

        Ok(IssuedToken {
            access_token,
            token_id,
            expires_in: lifetime.as_secs(),
            expires_at,
            scopes,
        })
    }

    /// Validates a token for one requested scope and returns its claims.
    ///
    /// # Errors
    ///
    /// - `InvalidSignature`, `MalformedToken`, `TokenExpired` from verification
    /// - `TokenRevoked` if the token was revoked
    /// - `ValidationFailed` if the revocation state cannot be read
    /// - `Timeout` / `ServiceUnavailable` if storage did not answer in time
    /// - `InsufficientScope` if `scope` is not one of the token's scopes
    pub async fn validate(&self, token: &str, scope: &str) -> AuthResult<Claims> {
        let claims = self.verify(token)?;

        match self.store.is_revoked(&claims.jti).await {
            Ok(false) => {}
            Ok(true) => {
                tracing::info!(client_id = %claims.client_id, token_id = %claims.jti, "Rejected revoked token");
                return Err(AuthError::TokenRevoked);
            }
            Err(e @ (AuthError::Timeout { .. } | AuthError::ServiceUnavailable { .. })) => {
                return Err(e);
            }
            Err(e) => {
                tracing::error!(
                    token_id = %claims.jti,
                    error = %e,
                    cause = e.cause().unwrap_or_default(),
                    "Revocation lookup failed"
                );
                return Err(AuthError::validation_failed("revocation state unavailable").with_cause(e));
            }
        }

        if !claims.has_scope(scope) {
            tracing::info!(client_id = %claims.client_id, scope, "Scope not granted");
            return Err(AuthError::insufficient_scope(scope));
        }

        Ok(claims)
    }

    /// Revokes a well-formed, correctly signed, unexpired token.
    ///
    /// Revoking an already revoked token succeeds.
    ///
    /// # Errors
    ///
    /// - verification errors as for [`CredentialAuthority::validate`]
    /// - storage errors from the revocation write
    pub async fn revoke(&self, token: &str) -> AuthResult<Claims> {
        let claims = self.verify(token)?;

        let revocation = RevocationRecord {
            client_id: claims.client_id.clone(),
            token_id: claims.jti.clone(),
            issued_at: claims.issued_at()?,
            expires_at: claims.expires_at()?,
            revoked_at: self.clock.now(),
        };
        self.store.revoke_token(&revocation).await?;

        tracing::info!(client_id = %claims.client_id, token_id = %claims.jti, "Token revoked");
        Ok(claims)
    }

    /// Returns the client cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ClientCache> {
        &self.cache
    }

    /// Returns the batch writer.
    #[must_use]
    pub fn batch(&self) -> &Arc<TokenBatchWriter> {
        &self.batch
    }

    fn verify(&self, token: &str) -> AuthResult<Claims> {
        self.jwt.decode(token, self.clock.now()).map_err(|e| {
            tracing::debug!(error = %e, "Token verification failed");
            AuthError::from(e)
        })
    }

    async fn resolve_client(&self, client_id: &str) -> AuthResult<Arc<Client>> {
        if let Some(client) = self.cache.get(client_id) {
            return Ok(client);
        }

        let Some(client) = self.store.find_client(client_id).await? else {
            tracing::info!(client_id, "Unknown client");
            return Err(AuthError::invalid_client("unknown client"));
        };

        self.cache.set(client_id, client.clone());
        Ok(Arc::new(client))
    }
}

impl std::fmt::Debug for CredentialAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialAuthority")
            .field("jwt", &self.jwt)
            .field("store", &self.store)
            .field("default_lifetime", &self.default_lifetime)
            .field("durability", &self.durability)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::SigningConfig;
    use crate::storage::{CredentialStore, MemoryCredentialStore, StorageTimeouts};
    use crate::token::hash_client_secret;
    use tokio_util::sync::CancellationToken;

    const ORDERS: &str = "https://api.example.com/orders";
    const BILLING: &str = "https://api.example.com/billing";

    struct Fixture {
        authority: CredentialAuthority,
        memory: Arc<MemoryCredentialStore>,
        clock: Arc<ManualClock>,
    }

    fn config(durability: Durability) -> AuthConfig {
        let mut config = AuthConfig {
            issuer: "https://auth.example.com".to_string(),
            signing: SigningConfig {
                secret: "0123456789abcdef0123456789abcdef".to_string(),
            },
            ..AuthConfig::default()
        };
        config.batch.durability = durability;
        config.batch.flush_interval = Duration::from_secs(3600);
        config
    }

    fn fixture_with(config: &AuthConfig) -> Fixture {
        let memory = Arc::new(MemoryCredentialStore::new());
        memory.insert_client(Client::new(
            "svc",
            "s3cret",
            vec![ORDERS.to_string(), BILLING.to_string()],
        ));

        let clock = Arc::new(ManualClock::new(
            OffsetDateTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        ));
        let store = DeadlineStore::new(
            memory.clone(),
            CancellationToken::new(),
            StorageTimeouts::default(),
        );
        let cache = Arc::new(ClientCache::with_clock(&config.cache, clock.clone()));
        let batch = Arc::new(TokenBatchWriter::new(&config.batch, store.clone()));
        let authority = CredentialAuthority::new(config, cache, store, batch, clock.clone());

        Fixture {
            authority,
            memory,
            clock,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(&config(Durability::WriteBehind))
    }

    #[tokio::test]
    async fn test_issue_then_validate_every_allowed_scope() {
        let f = fixture();
        let issued = f.authority.issue("svc", "s3cret").await.unwrap();

        assert_eq!(issued.token_id.len(), 32);
        assert_eq!(issued.expires_in, 3600);

        for scope in [ORDERS, BILLING] {
            let claims = f.authority.validate(&issued.access_token, scope).await.unwrap();
            assert_eq!(claims.client_id, "svc");
            assert_eq!(claims.jti, issued.token_id);
        }
    }

    #[tokio::test]
    async fn test_unknown_client_and_wrong_secret() {
        let f = fixture();

        let err = f.authority.issue("nobody", "s3cret").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidClient { .. }));

        let err = f.authority.issue("svc", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidClient { .. }));
        assert_eq!(err.public_message(), "Client authentication failed");
    }

    #[tokio::test]
    async fn test_store_hit_populates_cache() {
        let f = fixture();
        f.authority.issue("svc", "s3cret").await.unwrap();
        f.authority.issue("svc", "s3cret").await.unwrap();

        let stats = f.authority.cache().stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.size, 1);
    }

    #[tokio::test]
    async fn test_client_ttl_overrides_default() {
        let f = fixture();
        f.memory.insert_client(
            Client::new("short", "pw", vec![ORDERS.to_string()]).with_ttl(Duration::from_secs(120)),
        );

        let issued = f.authority.issue("short", "pw").await.unwrap();
        assert_eq!(issued.expires_in, 120);
        assert_eq!(issued.expires_at, f.clock.now() + Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_out_of_range_client_ttl_is_internal_error() {
        let f = fixture();
        let mut client = Client::new("big", "pw", vec![ORDERS.to_string()]);
        client.access_token_ttl = 1_000_000_000_000;
        f.memory.insert_client(client);

        let err = f.authority.issue("big", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::Internal { .. }), "{err:?}");

        // Other clients keep working.
        assert!(f.authority.issue("svc", "s3cret").await.is_ok());
    }

    #[tokio::test]
    async fn test_hashed_client_secret() {
        let f = fixture();
        let hash = hash_client_secret("hashed-pw").unwrap();
        f.memory
            .insert_client(Client::new("hashed", hash, vec![ORDERS.to_string()]));

        assert!(f.authority.issue("hashed", "hashed-pw").await.is_ok());
        assert!(f.authority.issue("hashed", "nope").await.is_err());
    }

    #[tokio::test]
    async fn test_scope_not_granted_is_forbidden() {
        let f = fixture();
        let issued = f.authority.issue("svc", "s3cret").await.unwrap();

        let err = f
            .authority
            .validate(&issued.access_token, "https://api.example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InsufficientScope { .. }));
        assert!(!err.is_token_rejection());
    }

    #[tokio::test]
    async fn test_scopes_are_snapshotted_at_issue() {
        let f = fixture();
        let issued = f.authority.issue("svc", "s3cret").await.unwrap();

        f.memory
            .insert_client(Client::new("svc", "s3cret", vec![BILLING.to_string()]));
        f.authority.cache().clear();

        assert!(f.authority.validate(&issued.access_token, ORDERS).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let f = fixture();
        let issued = f.authority.issue("svc", "s3cret").await.unwrap();

        f.clock.advance(Duration::from_secs(3600));
        let err = f
            .authority
            .validate(&issued.access_token, ORDERS)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn test_foreign_signature_rejected() {
        let f = fixture();
        let mut other = config(Durability::WriteBehind);
        other.signing.secret = "ffffffffffffffffffffffffffffffff".to_string();
        let g = fixture_with(&other);

        let issued = g.authority.issue("svc", "s3cret").await.unwrap();
        let err = f
            .authority
            .validate(&issued.access_token, ORDERS)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidSignature));
    }

    #[tokio::test]
    async fn test_revoke_then_validate_fails() {
        let f = fixture();
        let issued = f.authority.issue("svc", "s3cret").await.unwrap();

        f.authority.revoke(&issued.access_token).await.unwrap();
        let err = f
            .authority
            .validate(&issued.access_token, ORDERS)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenRevoked));

        // Idempotent.
        assert!(f.authority.revoke(&issued.access_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_revocation_survives_later_flush() {
        let f = fixture();
        let issued = f.authority.issue("svc", "s3cret").await.unwrap();
        assert_eq!(f.authority.batch().pending_count(), 1);

        f.authority.revoke(&issued.access_token).await.unwrap();
        assert_eq!(f.authority.batch().flush().await, 1);

        let record = f.memory.token(&issued.token_id).unwrap();
        assert!(record.revoked);
        assert!(record.revoked_at.is_some());
    }

    #[tokio::test]
    async fn test_revoke_rejects_garbage_and_expired() {
        let f = fixture();
        let err = f.authority.revoke("garbage").await.unwrap_err();
        assert!(matches!(err, AuthError::MalformedToken { .. }));

        let issued = f.authority.issue("svc", "s3cret").await.unwrap();
        f.clock.advance(Duration::from_secs(7200));
        let err = f.authority.revoke(&issued.access_token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn test_write_through_persists_before_returning() {
        let f = fixture_with(&config(Durability::WriteThrough));
        let issued = f.authority.issue("svc", "s3cret").await.unwrap();

        assert!(f.memory.token(&issued.token_id).is_some());
        assert_eq!(f.authority.batch().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_revocation_lookup_failure_is_not_valid() {
        let f = fixture();
        let issued = f.authority.issue("svc", "s3cret").await.unwrap();

        f.memory.close().await;
        let err = f
            .authority
            .validate(&issued.access_token, ORDERS)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ValidationFailed { .. }));
        assert!(err.cause().is_some());
    }
}
