//! Domain types shared by the cache, the batch writer and the storage layer.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

// =============================================================================
// Client
// =============================================================================

/// A registered machine client.
///
/// Loaded from storage and cached by [`crate::ClientCache`]; never mutated
/// by the service itself.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier.
    pub client_id: String,

    /// Shared secret. Either an Argon2 PHC string or a plain value.
    pub client_secret: String,

    /// Scopes (resource identifiers) this client may access.
    #[serde(default)]
    pub allowed_scopes: Vec<String>,

    /// Access token lifetime in seconds. Zero or negative means the
    /// service-wide default applies.
    #[serde(default)]
    pub access_token_ttl: i64,
}

impl Client {
    /// Creates a client with the service default token lifetime.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        allowed_scopes: Vec<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            allowed_scopes,
            access_token_ttl: 0,
        }
    }

    /// Sets the per-client token lifetime.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.access_token_ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        self
    }

    /// Returns the lifetime of tokens issued to this client.
    #[must_use]
    pub fn token_lifetime(&self, default: Duration) -> Duration {
        match u64::try_from(self.access_token_ttl) {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => default,
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("allowed_scopes", &self.allowed_scopes)
            .field("access_token_ttl", &self.access_token_ttl)
            .finish()
    }
}

// =============================================================================
// Token metadata
// =============================================================================

/// Persisted metadata of an issued access token.
///
/// The signed token itself is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Random hex token identifier (the `jti` claim).
    pub token_id: String,

    /// Owning client.
    pub client_id: String,

    /// Issue instant.
    #[serde(with = "time::serde::rfc3339")]
    pub issued_at: OffsetDateTime,

    /// Expiry instant.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Whether the token has been revoked.
    #[serde(default)]
    pub revoked: bool,

    /// When the token was revoked.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
}

impl TokenRecord {
    /// Creates a live (unrevoked) record.
    #[must_use]
    pub fn new(
        token_id: impl Into<String>,
        client_id: impl Into<String>,
        issued_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Self {
        Self {
            token_id: token_id.into(),
            client_id: client_id.into(),
            issued_at,
            expires_at,
            revoked: false,
            revoked_at: None,
        }
    }

    /// Returns `true` if the record lacks a token or client identifier.
    #[must_use]
    pub fn is_incomplete(&self) -> bool {
        self.token_id.is_empty() || self.client_id.is_empty()
    }
}

/// A revocation write.
///
/// Carries the token's issue and expiry instants so the store can record
/// a revocation even when the token's metadata has not been flushed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevocationRecord {
    /// Owning client.
    pub client_id: String,
    /// Revoked token identifier.
    pub token_id: String,
    /// Issue instant from the token's claims.
    pub issued_at: OffsetDateTime,
    /// Expiry instant from the token's claims.
    pub expires_at: OffsetDateTime,
    /// Revocation instant.
    pub revoked_at: OffsetDateTime,
}

impl RevocationRecord {
    /// Converts into the token row the revocation upserts.
    #[must_use]
    pub fn to_token_record(&self) -> TokenRecord {
        TokenRecord {
            token_id: self.token_id.clone(),
            client_id: self.client_id.clone(),
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            revoked: true,
            revoked_at: Some(self.revoked_at),
        }
    }
}

// =============================================================================
// Scope encoding
// =============================================================================

/// Encodes a scope list for storage. Always strict JSON.
#[must_use]
pub fn encode_scope_list(scopes: &[String]) -> String {
    serde_json::to_string(scopes).unwrap_or_else(|_| "[]".to_string())
}

/// Parses a stored scope list.
///
/// Accepts a strict JSON array of strings. Rows written by older tooling may
/// hold a loose delimited form such as `[a, b]`, `a,b` or `"a" "b"`; those are
/// split on commas and whitespace after stripping brackets and quotes.
#[must_use]
pub fn parse_scope_list(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if let Ok(scopes) = serde_json::from_str::<Vec<String>>(trimmed) {
        return scopes;
    }

    tracing::warn!(raw = %trimmed, "allowed_scopes is not a JSON array, parsing leniently");

    trimmed
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|s| s.trim_matches(|c| c == '"' || c == '\''))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
