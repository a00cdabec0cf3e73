//! Token issuance, validation and revocation.
//!
//! - [`jwt`] - HS256 signing and verification of [`Claims`]
//! - [`id`] - random token identifiers
//! - [`secret`] - client secret hashing and verification
//! - [`authority`] - the [`CredentialAuthority`] lifecycle

pub mod authority;
pub mod id;
pub mod jwt;
pub mod secret;

pub use authority::{CredentialAuthority, IssuedToken};
pub use id::generate_token_id;
pub use jwt::{Claims, JwtError, JwtService};
pub use secret::{hash_client_secret, verify_client_secret};
