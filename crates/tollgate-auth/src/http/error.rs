//! Error response mapping.
//!
//! Every error becomes `{"error": <code>, "error_description": <message>}`.
//! The description is [`AuthError::public_message`]; internal causes are
//! logged here and never serialized.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

impl AuthError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest { .. } | Self::UnsupportedGrantType { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidClient { .. } | Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            _ if self.is_token_rejection() => StatusCode::UNAUTHORIZED,
            Self::InsufficientScope { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Timeout { .. } | Self::ServiceUnavailable { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        let description = self.public_message();

        if self.is_server_error() {
            tracing::error!(
                error = %self,
                cause = self.cause().unwrap_or_default(),
                category = %self.category(),
                "Request failed"
            );
        } else {
            tracing::debug!(error = %self, category = %self.category(), "Request rejected");
        }

        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

        if status == StatusCode::UNAUTHORIZED {
            let www_auth = format!(r#"Bearer error="{code}", error_description="{description}""#);
            if let Ok(value) = HeaderValue::from_str(&www_auth) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }

        let body = json!({
            "error": code,
            "error_description": description,
        });

        (status, headers, Json(body)).into_response()
    }
}
