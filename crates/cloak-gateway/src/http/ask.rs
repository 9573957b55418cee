//! POST /v1/ask — the AI turn entry point. Saves the newest user message
//! into the AI cache (vault-encrypted under the dedicated inference key)
//! and hands the turn to the single-flight dispatcher.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use cloak_crypto::Crypto;
use cloak_protocol::model::{AskSkillRequest, CachedMessage, MessageRole, MessageStatus};

use crate::ai::dispatcher::{self, SubmitOutcome};
use crate::app::AppState;
use crate::auth;

pub async fn ask_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<AskSkillRequest>,
) -> Result<Json<Value>, StatusCode> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if !auth::check_bearer(auth_header, &state.config) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    if request.chat_id.is_empty() || request.message_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let chat_id = request.chat_id.clone();
    let user_id = request.user_id.clone();
    info!(user_id, chat_id, message_id = %request.message_id, "ask received");

    // Stage the newest user turn in the AI cache so the worker (and any
    // later continuation) can rebuild context server-side. This is the
    // one place plaintext touches the core, and it leaves vault-encrypted.
    if let Some(latest) = request
        .message_history
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::User)
    {
        match state
            .crypto
            .encrypt_with_key(&state.config.crypto.ai_inference_key_id, &latest.content)
            .await
        {
            Ok((encrypted_content, _)) => {
                let cached = CachedMessage {
                    id: request.message_id.clone(),
                    chat_id: chat_id.clone(),
                    role: MessageRole::User,
                    category: latest.category.clone(),
                    sender_name: latest.sender_name.clone(),
                    encrypted_content,
                    model_name: None,
                    status: MessageStatus::Sent,
                    created_at: latest.created_at,
                };
                if let Err(e) = state
                    .cache
                    .save_message_and_update_versions(&user_id, &chat_id, &cached, None)
                    .await
                {
                    warn!(user_id, chat_id, error = %e, "AI cache save failed, proceeding");
                }
            }
            Err(e) => {
                warn!(user_id, chat_id, error = %e, "inference-key encryption failed, proceeding");
            }
        }
    }

    match dispatcher::submit(&state, request).await {
        Ok(SubmitOutcome::Started(task_id)) => Ok(Json(json!({
            "task_id": task_id.as_str(),
            "queued": false,
        }))),
        Ok(SubmitOutcome::Queued { queue_len }) => Ok(Json(json!({
            "queued": true,
            "queue_len": queue_len,
        }))),
        Err(e) => {
            error!(chat_id, error = %e, "ask submission failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
