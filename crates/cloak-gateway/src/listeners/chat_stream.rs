//! `chat_stream::*` — token streaming with active-chat-aware fan-out.
//!
//! A device looking at the chat gets every chunk; every other device gets
//! exactly one background-completion pair when the stream finishes, so an
//! inactive UI can settle without ever seeing intermediate tokens.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

use cloak_protocol::events;
use cloak_protocol::frames::ServerFrame;

use crate::ai::{dispatcher, sanitize_stream_content};
use crate::app::AppState;
use crate::listeners::ERROR_BACKOFF;

pub async fn run(state: Arc<AppState>) -> cloak_cache::Result<()> {
    let mut subscription = state
        .cache
        .subscribe_pattern(events::CHAT_STREAM_PATTERN)
        .await?;

    while let Some(message) = subscription.next().await {
        let Some(data) = message.data else {
            error!(channel = %message.channel, "JSON decode error on chat-stream channel");
            continue;
        };
        if let Err(e) = handle_chunk(&state, &message.channel, data).await {
            error!(channel = %message.channel, error = %e, "chat-stream handler error");
            tokio::time::sleep(ERROR_BACKOFF).await;
        }
    }
    Ok(())
}

async fn handle_chunk(state: &AppState, channel: &str, mut data: Value) -> Result<(), String> {
    let event_type = data.get("type").and_then(|t| t.as_str()).unwrap_or("");
    if event_type != events::EV_AI_MESSAGE_CHUNK {
        warn!(channel, event_type, "unexpected event on chat-stream channel");
        return Ok(());
    }

    // Envelope validation only; payload internals are the worker's
    // business.
    for required in ["chat_id", "user_id_hash", "message_id"] {
        if data.get(required).is_none() {
            warn!(channel, field = required, "malformed stream chunk");
            return Ok(());
        }
    }
    let Some(user_id) = data
        .get("user_id_uuid")
        .and_then(|v| v.as_str())
        .map(str::to_string)
    else {
        warn!(channel, "stream chunk without user_id_uuid");
        return Ok(());
    };
    let chat_id = data
        .get("chat_id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let is_final_chunk = data
        .get("is_final_chunk")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    // Provider errors never reach a client verbatim.
    if let Some(content) = data.get("full_content_so_far").and_then(|v| v.as_str()) {
        let sanitized = sanitize_stream_content(content);
        if sanitized != content {
            warn!(chat_id, "error sentinel in stream content, rewriting");
            data["full_content_so_far"] = Value::String(sanitized.to_string());
        }
    }

    for device in state.manager.connections_for_user(&user_id) {
        let active_chat = state.manager.get_active_chat(&user_id, &device);
        if active_chat.as_deref() == Some(chat_id.as_str()) {
            state
                .manager
                .send_personal(
                    &ServerFrame::new(events::AI_MESSAGE_UPDATE, data.clone()),
                    &user_id,
                    &device,
                )
                .await;
            debug!(user_id, device, chat_id, "chunk sent to active device");
        } else if is_final_chunk {
            let completion = json!({
                "chat_id": chat_id,
                "message_id": data.get("message_id"),
                "user_message_id": data.get("user_message_id"),
                "task_id": data.get("task_id"),
                "full_content": data.get("full_content_so_far"),
                "interrupted_by_soft_limit": data
                    .get("interrupted_by_soft_limit")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
                "interrupted_by_revocation": data
                    .get("interrupted_by_revocation")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false),
            });
            state
                .manager
                .send_personal(
                    &ServerFrame::new(events::AI_BACKGROUND_RESPONSE_COMPLETED, completion),
                    &user_id,
                    &device,
                )
                .await;
            state
                .manager
                .send_personal(
                    &ServerFrame::new(
                        events::AI_TYPING_ENDED,
                        json!({
                            "chat_id": chat_id,
                            "message_id": data.get("message_id"),
                        }),
                    ),
                    &user_id,
                    &device,
                )
                .await;
            debug!(user_id, device, chat_id, "background completion sent to inactive device");
        }
    }

    // The final chunk ends the task: clear the single-flight marker and
    // fold queued turns into the next task.
    if is_final_chunk {
        dispatcher::complete(state, &chat_id)
            .await
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}
