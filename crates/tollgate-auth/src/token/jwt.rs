//! Signed access tokens.
//!
//! Tokens are compact JWS values signed with HS256 using the server-wide
//! shared secret. Verification pins the algorithm: a token whose header names
//! any other algorithm is rejected before its signature is looked at.
//!
//! Expiry and not-before are checked against a caller-supplied instant rather
//! than the system clock, so the authority's injected clock governs both
//! issuance and validation.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthError;

const ALGORITHM: Algorithm = Algorithm::HS256;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token is not valid yet.
    #[error("Token not yet valid")]
    NotYetValid,

    /// The token signature or algorithm is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `DecodingError`.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => Self::InvalidSignature,
            ErrorKind::InvalidIssuer | ErrorKind::MissingRequiredClaim(_) => {
                Self::invalid_claims(err.to_string())
            }
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => Self::TokenExpired,
            JwtError::InvalidSignature => Self::InvalidSignature,
            JwtError::EncodingError { message } => {
                Self::internal("failed to sign token").with_cause(message)
            }
            other => Self::malformed_token(other.to_string()),
        }
    }
}

// ============================================================================
// Claims
// ============================================================================

/// The signed token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer.
    pub iss: String,
    /// Subject; the client identifier.
    pub sub: String,
    /// Client identifier.
    pub client_id: String,
    /// Token identifier.
    pub jti: String,
    /// Snapshot of the client's allowed scopes at issue time.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Issued at (Unix seconds).
    pub iat: i64,
    /// Not before (Unix seconds).
    pub nbf: i64,
    /// Expires at (Unix seconds).
    pub exp: i64,
}

impl Claims {
    /// Builds claims valid from `issued_at` until `expires_at`.
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        token_id: impl Into<String>,
        scopes: Vec<String>,
        issued_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Self {
        let client_id = client_id.into();
        Self {
            iss: issuer.into(),
            sub: client_id.clone(),
            client_id,
            jti: token_id.into(),
            scopes,
            iat: issued_at.unix_timestamp(),
            nbf: issued_at.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        }
    }

    /// Returns `true` if the claims grant `scope` (exact match).
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// The `iat` claim as a timestamp.
    ///
    /// # Errors
    ///
    /// Returns `MalformedToken` if the value is out of range.
    pub fn issued_at(&self) -> Result<OffsetDateTime, AuthError> {
        timestamp(self.iat, "iat")
    }

    /// The `exp` claim as a timestamp.
    ///
    /// # Errors
    ///
    /// Returns `MalformedToken` if the value is out of range.
    pub fn expires_at(&self) -> Result<OffsetDateTime, AuthError> {
        timestamp(self.exp, "exp")
    }
}

fn timestamp(secs: i64, claim: &str) -> Result<OffsetDateTime, AuthError> {
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|_| AuthError::malformed_token(format!("{claim} out of range")))
}

// ============================================================================
// JWT Service
// ============================================================================

/// Signs and verifies access tokens.
///
/// Thread-safe; share it behind an `Arc`.
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl JwtService {
    /// Creates a service for the given shared secret and issuer.
    #[must_use]
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
        }
    }

    /// Returns the issuer placed in and required of every token.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Signs claims into a compact token.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self, claims: &Claims) -> Result<String, JwtError> {
        encode(&Header::new(ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    /// Verifies a token and returns its claims.
    ///
    /// Checks, in order: algorithm, signature, issuer and required claims,
    /// then `nbf` and `exp` against `now`. A token is expired from the
    /// second named by `exp` onwards.
    ///
    /// # Errors
    ///
    /// Returns the first failing check.
    pub fn decode(&self, token: &str, now: OffsetDateTime) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iat", "nbf", "iss"]);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)?.claims;

        let now = now.unix_timestamp();
        if claims.nbf > now {
            return Err(JwtError::NotYetValid);
        }
        if claims.exp <= now {
            return Err(JwtError::Expired);
        }
        Ok(claims)
    }
}

impl std::fmt::Debug for JwtService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtService")
            .field("algorithm", &ALGORITHM)
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";
    const ISSUER: &str = "https://auth.example.com";

    fn claims_at(now: OffsetDateTime, lifetime: Duration) -> Claims {
        Claims::new(
            ISSUER,
            "svc",
            "abc123",
            vec!["https://api.example.com".to_string()],
            now,
            now + lifetime,
        )
    }

    #[test]
    fn test_encode_decode() {
        let service = JwtService::new(SECRET, ISSUER);
        let now = OffsetDateTime::now_utc();
        let claims = claims_at(now, Duration::from_secs(60));

        let token = service.encode(&claims).unwrap();
        assert_eq!(token.split('.').count(), 3);

        let decoded = service.decode(&token, now).unwrap();
        assert_eq!(decoded, claims);
        assert!(decoded.has_scope("https://api.example.com"));
        assert!(!decoded.has_scope("https://api.example.com/other"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signer = JwtService::new(b"another-secret-another-secret-xx", ISSUER);
        let verifier = JwtService::new(SECRET, ISSUER);
        let now = OffsetDateTime::now_utc();

        let token = signer.encode(&claims_at(now, Duration::from_secs(60))).unwrap();
        let err = verifier.decode(&token, now).unwrap_err();
        assert!(matches!(err, JwtError::InvalidSignature));
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let service = JwtService::new(SECRET, ISSUER);
        let now = OffsetDateTime::now_utc();
        let token = encode(
            &Header::new(Algorithm::HS384),
            &claims_at(now, Duration::from_secs(60)),
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap();

        let err = service.decode(&token, now).unwrap_err();
        assert!(matches!(err, JwtError::InvalidSignature));
    }

    #[test]
    fn test_expiry_uses_supplied_instant() {
        let service = JwtService::new(SECRET, ISSUER);
        let issued = OffsetDateTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let token = service
            .encode(&claims_at(issued, Duration::from_secs(60)))
            .unwrap();

        assert!(service.decode(&token, issued + Duration::from_secs(59)).is_ok());
        let err = service
            .decode(&token, issued + Duration::from_secs(60))
            .unwrap_err();
        assert!(matches!(err, JwtError::Expired));
    }

    #[test]
    fn test_not_yet_valid() {
        let service = JwtService::new(SECRET, ISSUER);
        let issued = OffsetDateTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let token = service
            .encode(&claims_at(issued, Duration::from_secs(60)))
            .unwrap();

        let err = service
            .decode(&token, issued - Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, JwtError::NotYetValid));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let signer = JwtService::new(SECRET, "https://evil.example.com");
        let verifier = JwtService::new(SECRET, ISSUER);
        let now = OffsetDateTime::now_utc();
        let mut claims = claims_at(now, Duration::from_secs(60));
        claims.iss = "https://evil.example.com".to_string();

        let token = signer.encode(&claims).unwrap();
        let err = verifier.decode(&token, now).unwrap_err();
        assert!(matches!(err, JwtError::InvalidClaims { .. }));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let service = JwtService::new(SECRET, ISSUER);
        let err = service
            .decode("not-a-token", OffsetDateTime::now_utc())
            .unwrap_err();
        assert!(matches!(err, JwtError::DecodingError { .. }));

        let auth: AuthError = err.into();
        assert!(matches!(auth, AuthError::MalformedToken { .. }));
    }

    #[test]
    fn test_error_mapping_to_auth_error() {
        assert!(matches!(
            AuthError::from(JwtError::Expired),
            AuthError::TokenExpired
        ));
        assert!(matches!(
            AuthError::from(JwtError::InvalidSignature),
            AuthError::InvalidSignature
        ));
        assert!(matches!(
            AuthError::from(JwtError::encoding_error("boom")),
            AuthError::Internal { .. }
        ));
        assert!(matches!(
            AuthError::from(JwtError::NotYetValid),
            AuthError::MalformedToken { .. }
        ));
    }
}
