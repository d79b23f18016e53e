//! Session management handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::AppState;
use shmulik_common::{
    errors::{AppError, Result},
    metrics::RequestMetrics,
    models::ConversationTurn,
};

/// A conversation's recorded turns, oldest first
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTranscript {
    pub session_id: String,
    pub turns: Vec<ConversationTurn>,
}

/// Read back a conversation
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionTranscript>> {
    let request_metrics = RequestMetrics::start("GET", "/sessions");

    match state.conversations.history(&session_id).await {
        Some(turns) => {
            request_metrics.finish(200);
            Ok(Json(SessionTranscript { session_id, turns }))
        }
        None => {
            request_metrics.finish(404);
            Err(AppError::SessionNotFound { id: session_id })
        }
    }
}

/// Forget a conversation
pub async fn reset_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode> {
    let request_metrics = RequestMetrics::start("DELETE", "/sessions");

    if state.conversations.reset(&session_id).await {
        request_metrics.finish(204);
        Ok(StatusCode::NO_CONTENT)
    } else {
        request_metrics.finish(404);
        Err(AppError::SessionNotFound { id: session_id })
    }
}

#[cfg(test)]
mod tests {
    use crate::handlers::test_support::{body_json, post_json, test_app, FixedModel};
    use axum::{body::Body, http::Request};
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn delete(uri: &str) -> Request<Body> {
        Request::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_transcript_lists_turns_in_order() {
        let (app, _) = test_app(Arc::new(FixedModel::replying("It improves outcomes [1]."))).await;
        app.clone()
            .oneshot(post_json("/chat", json!({ "sessionId": "s", "message": "health literacy" })))
            .await
            .unwrap();

        let response = app.oneshot(get("/sessions/s")).await.unwrap();
        assert_eq!(response.status(), 200);

        let body = body_json(response).await;
        assert_eq!(body["sessionId"], "s");
        let turns = body["turns"].as_array().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0]["role"], "user");
        assert_eq!(turns[0]["text"], "health literacy");
        assert_eq!(turns[1]["role"], "assistant");
        assert_eq!(turns[1]["text"], "It improves outcomes [1].");
    }

    #[tokio::test]
    async fn test_transcript_of_unknown_session_is_not_found() {
        let (app, _) = test_app(Arc::new(FixedModel::replying("ok [1]"))).await;
        let response = app.oneshot(get("/sessions/missing")).await.unwrap();
        assert_eq!(response.status(), 404);
        assert_eq!(body_json(response).await["error"]["code"], "SESSION_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_reset_existing_session() {
        let (app, state) = test_app(Arc::new(FixedModel::replying("ok [1]"))).await;
        app.clone()
            .oneshot(post_json("/chat", json!({ "sessionId": "s", "message": "health literacy" })))
            .await
            .unwrap();

        let response = app.clone().oneshot(delete("/sessions/s")).await.unwrap();
        assert_eq!(response.status(), 204);
        assert!(state.conversations.history("s").await.is_none());

        let response = app.oneshot(delete("/sessions/s")).await.unwrap();
        assert_eq!(response.status(), 404);
    }
}
