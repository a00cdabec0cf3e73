use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::json;
use tollgate_auth::{BatchStats, CacheStats};

use crate::server::AppState;

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
pub struct ReadinessReport {
    pub status: &'static str,
    pub storage: &'static str,
    pub cache: CacheStats,
    pub batch: BatchStats,
}

/// Readiness: 503 once shutdown has begun.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let authority = &state.oauth.authority;
    let shutting_down = state.shutdown.is_cancelled();
    let report = ReadinessReport {
        status: if shutting_down { "shutting_down" } else { "ready" },
        storage: state.storage_backend,
        cache: authority.cache().stats(),
        batch: authority.batch().stats(),
    };
    let status = if shutting_down {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(report))
}
