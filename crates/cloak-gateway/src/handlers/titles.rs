//! Title updates: version bump, cache write, persistence job, broadcast.

use serde_json::json;
use tracing::{error, info, warn};

use cloak_jobs::{QUEUE_PERSISTENCE, TASK_PERSIST_CHAT_TITLE};
use cloak_protocol::events;
use cloak_protocol::frames::ServerFrame;
use cloak_protocol::messages::UpdateTitle;

use crate::app::AppState;
use crate::auth::Identity;

// Ciphertext runs longer than the cleartext it carries; this bounds the
// cleartext at roughly the UI's title limit.
const MAX_ENCRYPTED_TITLE_LEN: usize = 1000;

pub async fn handle_update_title(state: &AppState, identity: &Identity, payload: UpdateTitle) {
    let user_id = identity.user_id.as_str();
    let device = identity.device_hash.as_str();
    let chat_id = payload.chat_id.as_str();
    let encrypted_title = payload.encrypted_title.as_str();

    if encrypted_title.len() > MAX_ENCRYPTED_TITLE_LEN {
        warn!(
            user_id,
            chat_id,
            len = encrypted_title.len(),
            "encrypted title too long"
        );
        state
            .manager
            .send_personal(
                &ServerFrame::error("New title is too long.", Some(chat_id)),
                user_id,
                device,
            )
            .await;
        return;
    }

    let title_v = match state.cache.increment_component(user_id, chat_id, "title_v").await {
        Ok(v) => v,
        Err(e) => {
            error!(user_id, chat_id, error = %e, "title_v bump failed");
            state
                .manager
                .send_personal(
                    &ServerFrame::error("Failed to update title version in cache.", Some(chat_id)),
                    user_id,
                    device,
                )
                .await;
            return;
        }
    };

    // Version is already bumped; a failed data write here is a partial
    // failure the next sync repairs. Continue with persistence/broadcast.
    if let Err(e) = state
        .cache
        .set_list_item_field(user_id, chat_id, "title", encrypted_title)
        .await
    {
        error!(user_id, chat_id, error = %e, "list-item title write failed");
    }

    if let Err(e) = state
        .jobs
        .enqueue(
            QUEUE_PERSISTENCE,
            TASK_PERSIST_CHAT_TITLE,
            json!({
                "chat_id": chat_id,
                "encrypted_title": encrypted_title,
                "title_v": title_v,
            }),
        )
        .await
    {
        error!(user_id, chat_id, error = %e, "title persistence enqueue failed");
    }

    state
        .manager
        .broadcast_event(
            user_id,
            events::CHAT_TITLE_UPDATED,
            json!({
                "chat_id": chat_id,
                "data": { "encrypted_title": encrypted_title },
                "versions": { "title_v": title_v },
            }),
        )
        .await;
    info!(user_id, chat_id, title_v, "chat_title_updated broadcast");
}
