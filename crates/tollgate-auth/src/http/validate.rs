//! Validation endpoint handler, called by a gateway in front of resources.
//!
//! # Request Format
//!
//! ```text
//! POST /oauth/validate
//! Authorization: Bearer <token>
//! X-Resource-URL: https://api.example.com/orders
//! ```

use axum::{Json, extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;

use super::{OAuthState, bearer_token};
use crate::AuthError;

/// Validation response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ValidateResponse {
    /// Always `true`; failures are error responses.
    pub valid: bool,
    /// Owning client.
    pub client_id: String,
    /// Expiry, RFC 3339.
    pub expires_at: String,
    /// Scopes carried by the token.
    pub scopes: Vec<String>,
}

/// `POST /oauth/validate`
///
/// - 200 OK: token is live and grants the resource
/// - 400 Bad Request: resource header missing
/// - 401 Unauthorized: bearer header missing or token rejected
/// - 403 Forbidden: resource not among the token's scopes
pub async fn validate_handler(
    State(state): State<OAuthState>,
    headers: HeaderMap,
) -> Result<Json<ValidateResponse>, AuthError> {
    let resource = headers
        .get(&state.resource_header)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            AuthError::invalid_request(format!("missing {} header", state.resource_header))
        })?;
    let token = bearer_token(&headers)?;

    let claims = state.authority.validate(token, resource).await?;
    let expires_at = claims
        .expires_at()?
        .format(&Rfc3339)
        .map_err(|e| AuthError::internal("failed to format expiry").with_cause(e))?;

    Ok(Json(ValidateResponse {
        valid: true,
        client_id: claims.client_id,
        expires_at,
        scopes: claims.scopes,
    }))
}
