//! HTTP handlers for the OAuth endpoints.
//!
//! # Available Handlers
//!
//! - [`token`] - `POST /oauth/token` (client credentials grant)
//! - [`validate`] - `POST /oauth/validate` (gateway token check)
//! - [`revoke`] - `POST /oauth/revoke`
//!
//! # Usage
//!
//! ```ignore
//! use axum::{Router, routing::post};
//! use tollgate_auth::http::{OAuthState, revoke_handler, token_handler, validate_handler};
//!
//! let app = Router::new()
//!     .route("/oauth/token", post(token_handler))
//!     .route("/oauth/validate", post(validate_handler))
//!     .route("/oauth/revoke", post(revoke_handler))
//!     .with_state(state);
//! ```

mod error;
pub mod revoke;
pub mod token;
pub mod validate;

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, header};

use crate::token::CredentialAuthority;
use crate::{AuthError, AuthResult};

pub use revoke::revoke_handler;
pub use token::token_handler;
pub use validate::validate_handler;

/// Default header carrying the resource a gateway is authorizing.
pub const DEFAULT_RESOURCE_HEADER: &str = "x-resource-url";

/// State shared by the OAuth handlers.
#[derive(Clone)]
pub struct OAuthState {
    /// Issues, validates and revokes tokens.
    pub authority: Arc<CredentialAuthority>,
    /// Header that names the resource on validation requests.
    pub resource_header: HeaderName,
}

impl OAuthState {
    /// Creates handler state.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `resource_header` is not a valid header name.
    pub fn new(authority: Arc<CredentialAuthority>, resource_header: &str) -> AuthResult<Self> {
        let resource_header = HeaderName::try_from(resource_header).map_err(|e| {
            AuthError::configuration(format!("invalid resource header name '{resource_header}': {e}"))
        })?;
        Ok(Self {
            authority,
            resource_header,
        })
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
///
/// The scheme is matched case-insensitively.
///
/// # Errors
///
/// Returns `Unauthorized` if the header is missing, not UTF-8, uses another
/// scheme or carries an empty token.
pub fn bearer_token(headers: &HeaderMap) -> AuthResult<&str> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AuthError::unauthorized("missing bearer token"))?
        .to_str()
        .map_err(|_| AuthError::unauthorized("malformed authorization header"))?;

    let (scheme, token) = value
        .split_once(' ')
        .ok_or_else(|| AuthError::unauthorized("malformed authorization header"))?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AuthError::unauthorized("authorization scheme must be Bearer"));
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::unauthorized("empty bearer token"));
    }
    Ok(token)
}
