//! Chat deletion: a tombstone, never a destructive race. The cache is
//! cleared, persistence is enqueued, and every device hears about it —
//! in that order, each step best-effort once the first succeeds.

use serde_json::json;
use tracing::{error, info, warn};

use cloak_jobs::{QUEUE_PERSISTENCE, TASK_PERSIST_DELETE_CHAT};
use cloak_protocol::events;
use cloak_protocol::frames::ServerFrame;
use cloak_protocol::messages::DeleteChat;

use crate::app::AppState;
use crate::auth::Identity;

pub async fn handle_delete_chat(state: &AppState, identity: &Identity, payload: DeleteChat) {
    let user_id = identity.user_id.as_str();
    let device = identity.device_hash.as_str();
    let chat_id = payload.chat_id.as_str();
    info!(user_id, device, chat_id, "delete_chat requested");

    match state.cache.remove_chat_from_ids(user_id, chat_id).await {
        Ok(true) => info!(user_id, chat_id, "removed from chat list sorted set"),
        Ok(false) => warn!(user_id, chat_id, "chat was not in sorted set during delete"),
        Err(e) => {
            error!(user_id, chat_id, error = %e, "sorted-set removal failed");
            state
                .manager
                .send_personal(
                    &ServerFrame::error(
                        format!("Failed to process delete request for chat {}", chat_id),
                        Some(chat_id),
                    ),
                    user_id,
                    device,
                )
                .await;
            return;
        }
    }

    // Cache cleanup: versions + list item + both message lists in one
    // pipeline, then the embed cascade and app-settings sweep.
    if let Err(e) = state.cache.delete_chat_general_keys(user_id, chat_id).await {
        error!(user_id, chat_id, error = %e, "general key cleanup failed");
    }
    if let Err(e) = state.cache.delete_ai_messages(user_id, chat_id).await {
        warn!(user_id, chat_id, error = %e, "AI cache cleanup failed");
    }
    match state.cache.delete_chat_embeds(chat_id).await {
        Ok(count) if count > 0 => info!(user_id, chat_id, count, "embeds deleted"),
        Ok(_) => {}
        Err(e) => warn!(user_id, chat_id, error = %e, "embed cleanup failed"),
    }
    if let Err(e) = state.cache.delete_chat_app_settings(user_id, chat_id).await {
        warn!(user_id, chat_id, error = %e, "app settings cleanup failed");
    }
    if let Err(e) = state.cache.delete_pending_request(chat_id).await {
        warn!(user_id, chat_id, error = %e, "pending request cleanup failed");
    }

    // Durable deletion runs in the background; a failed enqueue must not
    // block the tombstone broadcast.
    if let Err(e) = state
        .jobs
        .enqueue(
            QUEUE_PERSISTENCE,
            TASK_PERSIST_DELETE_CHAT,
            json!({
                "user_id": user_id,
                "hashed_user_id": identity.user_id_hash.as_str(),
                "chat_id": chat_id,
            }),
        )
        .await
    {
        error!(user_id, chat_id, error = %e, "delete persistence enqueue failed");
    }

    // Every device, the requester included, drops the chat.
    state
        .manager
        .broadcast_to_user(
            &ServerFrame::new(
                events::CHAT_DELETED,
                json!({ "chat_id": chat_id, "tombstone": true }),
            ),
            user_id,
            None,
        )
        .await;
    info!(user_id, chat_id, "chat_deleted broadcast");
}
