//! # tollgate-auth
//!
//! Core of the Tollgate machine-to-machine authorization service.
//!
//! This crate provides:
//! - A bounded, expiring in-memory cache of OAuth clients ([`cache`])
//! - A write-behind batch writer for issued token metadata ([`batch`])
//! - The credential authority: issue, validate and revoke ([`token`])
//! - The storage capability and its in-memory backend ([`storage`])
//! - Axum handlers for the OAuth endpoints ([`http`])
//!
//! ## Modules
//!
//! - [`config`] - Authentication configuration
//! - [`error`] - Error taxonomy shared by every layer
//! - [`clock`] - Injectable time source
//! - [`types`] - Clients, token records and revocation records
//! - [`storage`] - `CredentialStore` trait, deadline wrapper, memory backend
//! - [`cache`] - `ClientCache`
//! - [`batch`] - `TokenBatchWriter`
//! - [`token`] - JWT signing, token identifiers, `CredentialAuthority`
//! - [`http`] - Axum handlers and error responses

pub mod batch;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod storage;
pub mod token;
pub mod types;

pub use batch::{BatchStats, TokenBatchWriter};
pub use cache::{CacheStats, ClientCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AuthConfig, BatchConfig, ClientCacheConfig, ConfigError, Durability, SigningConfig, TokenSettings,
};
pub use error::{AuthError, ErrorCategory};
pub use http::{OAuthState, revoke_handler, token_handler, validate_handler};
pub use storage::{CredentialStore, DeadlineStore, MemoryCredentialStore, StorageTimeouts};
pub use token::{
    Claims, CredentialAuthority, IssuedToken, JwtError, JwtService, generate_token_id,
    hash_client_secret, verify_client_secret,
};
pub use types::{Client, RevocationRecord, TokenRecord, encode_scope_list, parse_scope_list};

/// Type alias for authentication/authorization results.
pub type AuthResult<T> = Result<T, AuthError>;
