//! Client secret hashing and verification.
//!
//! Stored secrets are either Argon2 PHC strings (`$argon2id$...`) or, for
//! rows provisioned by older tooling, the plain secret. Plain secrets are
//! compared in constant time.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::{AuthError, AuthResult};

const PHC_PREFIX: &str = "$argon2";

/// Hashes a client secret with Argon2id for storage.
///
/// # Errors
///
/// Returns an internal error if hashing fails.
pub fn hash_client_secret(secret: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::internal("failed to hash client secret").with_cause(e))
}

/// Returns `true` if `presented` matches the stored secret.
///
/// A stored value that looks like a PHC string but does not parse never
/// matches.
#[must_use]
pub fn verify_client_secret(presented: &str, stored: &str) -> bool {
    if stored.starts_with(PHC_PREFIX) {
        return match PasswordHash::new(stored) {
            Ok(parsed) => Argon2::default()
                .verify_password(presented.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "Stored client secret is not a valid PHC string");
                false
            }
        };
    }

    constant_time_eq(presented.as_bytes(), stored.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
