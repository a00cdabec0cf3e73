//! Token endpoint handler.
//!
//! # Request Format
//!
//! ```text
//! POST /oauth/token
//! Content-Type: application/json
//!
//! {"grant_type": "client_credentials", "client_id": "...", "client_secret": "..."}
//! ```
//!
//! # Response
//!
//! ```json
//! {"access_token": "eyJ...", "token_type": "Bearer", "expires_in": 3600}
//! ```

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::OAuthState;
use crate::AuthError;

const CLIENT_CREDENTIALS: &str = "client_credentials";

/// Token request body.
#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    /// Must be `client_credentials`.
    #[serde(default)]
    pub grant_type: Option<String>,
    /// Client identifier.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Client secret.
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Token response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The signed access token.
    pub access_token: String,
    /// Always `Bearer`.
    pub token_type: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// `POST /oauth/token`
///
/// - 200 OK: token issued
/// - 400 Bad Request: malformed body, missing field or unsupported grant type
/// - 401 Unauthorized: unknown client or wrong secret
/// - 500 / 503: signing or storage failure
pub async fn token_handler(
    State(state): State<OAuthState>,
    body: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Response, AuthError> {
    let Json(request) = body.map_err(|e| AuthError::invalid_request(e.body_text()))?;

    let grant_type = required(request.grant_type, "grant_type")?;
    if grant_type != CLIENT_CREDENTIALS {
        return Err(AuthError::unsupported_grant_type(grant_type));
    }
    let client_id = required(request.client_id, "client_id")?;
    let client_secret = required(request.client_secret, "client_secret")?;

    let issued = state.authority.issue(&client_id, &client_secret).await?;

    let body = TokenResponse {
        access_token: issued.access_token,
        token_type: "Bearer".to_string(),
        expires_in: issued.expires_in,
    };
    Ok((
        [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Json(body),
    )
        .into_response())
}

fn required(value: Option<String>, field: &str) -> Result<String, AuthError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::invalid_request(format!("missing required field '{field}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_support::app;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn post_json(body: &str) -> Request<Body> {
        Request::post("/oauth/token")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_issues_token() {
        let (router, _) = app();
        let response = router
            .oneshot(post_json(
                r#"{"grant_type":"client_credentials","client_id":"svc","client_secret":"s3cret"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["token_type"], "Bearer");
        assert_eq!(body["expires_in"], 600);
        assert!(body["access_token"].as_str().unwrap().contains('.'));
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let (router, _) = app();
        let response = router.oneshot(post_json("{not json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_unsupported_grant() {
        let (router, _) = app();
        let response = router
            .oneshot(post_json(
                r#"{"grant_type":"password","client_id":"svc","client_secret":"s3cret"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "unsupported_grant_type");
    }

    #[tokio::test]
    async fn test_wrong_secret_is_unauthorized() {
        let (router, _) = app();
        let response = router
            .oneshot(post_json(
                r#"{"grant_type":"client_credentials","client_id":"svc","client_secret":"nope"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"], "invalid_client");
    }

    #[tokio::test]
    async fn test_missing_field_is_bad_request() {
        let (router, _) = app();
        let response = router
            .oneshot(post_json(r#"{"grant_type":"client_credentials","client_id":"svc"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
