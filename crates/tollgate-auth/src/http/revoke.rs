//! Revocation endpoint handler.
//!
//! ```text
//! POST /oauth/revoke
//! Authorization: Bearer <token>
//! ```
//!
//! The presented token itself is revoked. Revoking it again succeeds.

use axum::{Json, extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};

use super::{OAuthState, bearer_token};
use crate::AuthError;

/// Revocation response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct RevokeResponse {
    /// Always `revoked`.
    pub message: String,
}

/// `POST /oauth/revoke`
///
/// - 200 OK: token revoked (or already revoked)
/// - 401 Unauthorized: bearer header missing, token invalid or expired
/// - 500 / 503: storage failure
pub async fn revoke_handler(
    State(state): State<OAuthState>,
    headers: HeaderMap,
) -> Result<Json<RevokeResponse>, AuthError> {
    let token = bearer_token(&headers)?;
    state.authority.revoke(token).await?;

    Ok(Json(RevokeResponse {
        message: "revoked".to_string(),
    }))
}
