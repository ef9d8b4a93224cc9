//! HTTP request handlers

use super::sse::sse_stream;
use super::AppState;
use crate::wire::{ChatRequest, StreamEvent};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Streaming chat
        .route("/api/chat", post(chat))
        .route("/api/health", get(health))
        .with_state(state)
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, AppError> {
    let has_text = request
        .last_user_text()
        .is_some_and(|text| !text.trim().is_empty());
    if !has_text {
        return Err(AppError::BadRequest(
            "Request must contain a user message".to_string(),
        ));
    }

    tracing::info!(
        message_count = request.messages.len(),
        user_id = ?request.user_id,
        producer = state.producer.name(),
        "Chat request"
    );

    let cancel = CancellationToken::new();
    let events = match state.producer.open(&request, cancel.clone()).await {
        Ok(events) => events,
        Err(e) => {
            // The stream still opens; the failure is reported in-band
            tracing::error!(error = %e, "Failed to start chat stream");
            let event = StreamEvent::error(
                format!("Internal server error: {}", e.message),
                Some("INTERNAL_ERROR"),
            );
            futures::stream::once(async move { Ok(event) }).boxed()
        }
    };

    Ok(sse_stream(events, cancel).into_response())
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "producer": state.producer.name(),
    }))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
