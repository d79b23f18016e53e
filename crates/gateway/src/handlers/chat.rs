//! Chat handler

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use shmulik_common::{
    errors::{AppError, Result},
    metrics::RequestMetrics,
    models::Evidence,
};

/// Chat request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Omit to start a new conversation
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub session_id: Option<String>,

    #[validate(length(min = 1))]
    pub message: String,
}

/// Chat response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    pub response: String,
    pub session_id: String,
    pub sources: Vec<Evidence>,
}

/// Answer one message within a conversation
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    let request_metrics = RequestMetrics::start("POST", "/chat");
    let result = answer(&state, request).await;
    request_metrics.finish(match &result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    });
    result.map(Json)
}

async fn answer(state: &AppState, request: ChatRequest) -> Result<ChatResponse> {
    request.validate()?;

    let message = request.message.trim();
    if message.is_empty() {
        return Err(AppError::Validation {
            message: "Message must not be blank".to_string(),
            field: Some("message".to_string()),
        });
    }
    let size = message.chars().count();
    let limit = state.config.server.max_message_chars;
    if size > limit {
        return Err(AppError::PayloadTooLarge { size, limit });
    }

    let session_id = request
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let answer = state.conversations.submit(&session_id, message).await;

    tracing::info!(
        session_id = %session_id,
        success = answer.success,
        outcome = ?answer.outcome,
        sources = answer.evidence.len(),
        "Chat message answered"
    );

    Ok(ChatResponse {
        success: answer.success,
        response: answer.text,
        session_id,
        sources: answer.evidence,
    })
}

#[cfg(test)]
mod tests {
    use crate::handlers::test_support::{body_json, post_json, test_app, FixedModel};
    use serde_json::json;
    use std::sync::Arc;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_chat_answers_with_sources() {
        let model = Arc::new(FixedModel::replying("Literacy improves outcomes [1]."));
        let (app, _) = test_app(model.clone()).await;

        let response = app
            .oneshot(post_json("/chat", json!({ "message": "What does health literacy improve?" })))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["response"], "Literacy improves outcomes [1].");
        assert!(!body["sessionId"].as_str().unwrap().is_empty());
        assert_eq!(body["sources"][0]["sourceFile"], "literacy.pdf");
        assert_eq!(body["sources"][0]["pages"]["first"], 1);
        assert_eq!(model.calls(), 1);
    }

    #[tokio::test]
    async fn test_chat_keeps_session_history() {
        let model = Arc::new(FixedModel::replying("ok [1]"));
        let (app, state) = test_app(model.clone()).await;

        for message in ["health literacy first", "health literacy second"] {
            let response = app
                .clone()
                .oneshot(post_json("/chat", json!({ "sessionId": "s-1", "message": message })))
                .await
                .unwrap();
            assert_eq!(body_json(response).await["sessionId"], "s-1");
        }

        let history = state.conversations.history("s-1").await.unwrap();
        assert_eq!(history.len(), 4);
        assert!(model.last_prompt().contains("health literacy first"));
    }

    #[tokio::test]
    async fn test_generation_failure_is_unsuccessful_answer() {
        let (app, state) = test_app(Arc::new(FixedModel::failing())).await;

        let response = app
            .oneshot(post_json("/chat", json!({ "sessionId": "s", "message": "health literacy?" })))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["response"], "Sorry, I encountered an error. Please try again.");
        assert_eq!(state.conversations.history("s").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_blank_message_rejected() {
        let (app, _) = test_app(Arc::new(FixedModel::replying("unused"))).await;

        let response = app
            .oneshot(post_json("/chat", json!({ "message": "   " })))
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
        assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_oversized_message_rejected() {
        let (app, _) = test_app(Arc::new(FixedModel::replying("unused"))).await;

        let response = app
            .oneshot(post_json("/chat", json!({ "message": "x".repeat(4001) })))
            .await
            .unwrap();
        assert_eq!(response.status(), 413);
    }
}
