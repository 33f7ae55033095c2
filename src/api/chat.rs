//! `POST /chat`: topic gate in front of the generation backend.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::AppState;
use crate::error::ApiError;

/// Successful chat reply (generated or refusal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

pub fn chat_routes() -> Router<AppState> {
    Router::new().route("/chat", post(chat))
}

/// Pull a usable `message` out of the request body.
///
/// Absent, non-string and whitespace-only messages, and bodies that are not
/// JSON at all, are all "no message".
fn extract_message(payload: Result<Json<Value>, JsonRejection>) -> Result<String, ApiError> {
    let Ok(Json(body)) = payload else {
        return Err(ApiError::NoMessage);
    };
    match body.get("message").and_then(Value::as_str) {
        Some(message) if !message.trim().is_empty() => Ok(message.to_string()),
        _ => Err(ApiError::NoMessage),
    }
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = extract_message(payload)?;

    if !state.gate.evaluate(&message).is_relevant() {
        info!("Chat message refused by topic gate");
        return Ok(Json(ChatResponse {
            response: state.gate.refusal().to_string(),
        }));
    }

    let reply = state.llm.generate(&message).await.map_err(|e| {
        warn!(model = state.llm.model_name(), error = %e, "Generation failed");
        ApiError::Generation(e)
    })?;

    info!(
        model = state.llm.model_name(),
        reply_chars = reply.chars().count(),
        "Chat reply generated"
    );
    Ok(Json(ChatResponse { response: reply }))
}
