//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;
use shmulik_common::index::IndexStats;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub index: IndexHealth,
    pub active_sessions: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexHealth {
    pub loaded: bool,
    #[serde(flatten)]
    pub stats: IndexStats,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Liveness probe with index details. Never calls the language model.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: shmulik_common::VERSION.to_string(),
        index: IndexHealth {
            loaded: state.index_loaded,
            stats: state.index.stats().await,
        },
        active_sessions: state.conversations.session_count().await,
    })
}

/// Readiness probe - ready once the index is loaded and has entries
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let reason = if !state.index_loaded {
        Some("vector index not loaded")
    } else if state.index.is_empty().await {
        Some("vector index is empty")
    } else {
        None
    };

    match reason {
        None => (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ready".to_string(),
                reason: None,
            }),
        ),
        Some(reason) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyResponse {
                status: "not_ready".to_string(),
                reason: Some(reason.to_string()),
            }),
        ),
    }
}
