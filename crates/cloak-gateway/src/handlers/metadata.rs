//! Zero-knowledge write paths for chat metadata: the encrypted user
//! message + per-chat blobs after preprocessing, and the client-encrypted
//! post-processing artifacts.

use serde_json::json;
use tracing::{error, info, warn};

use cloak_core::error::{CoreError, Result};
use cloak_jobs::{
    QUEUE_PERSISTENCE, TASK_PERSIST_ENCRYPTED_CHAT_METADATA, TASK_PERSIST_NEW_CHAT_MESSAGE,
    TASK_PERSIST_NEW_CHAT_SUGGESTIONS,
};
use cloak_protocol::events;
use cloak_protocol::frames::ServerFrame;
use cloak_protocol::messages::{EncryptedChatMetadata, UpdatePostProcessingMetadata};

use crate::app::AppState;
use crate::auth::Identity;

pub async fn handle_encrypted_chat_metadata(
    state: &AppState,
    identity: &Identity,
    payload: EncryptedChatMetadata,
) {
    let user_id = identity.user_id.as_str();
    let device = identity.device_hash.as_str();

    let Some(chat_id) = payload.chat_id.as_deref() else {
        error!(user_id, device, "encrypted metadata without chat_id");
        state
            .manager
            .send_personal(
                &ServerFrame::error("Missing chat_id in encrypted metadata", None),
                user_id,
                device,
            )
            .await;
        return;
    };
    info!(user_id, chat_id, "processing encrypted chat metadata");

    // Zero-knowledge enforcement: plaintext alongside ciphertext is
    // dropped before any processing.
    if payload.content.is_some() {
        warn!(
            user_id,
            chat_id, "stripping plaintext content from encrypted metadata"
        );
    }

    let now = chrono::Utc::now().timestamp();
    let created_at = payload.created_at.unwrap_or(now);
    let last_edited = payload
        .versions
        .last_edited_overall_timestamp
        .unwrap_or(created_at);

    // Store the encrypted user message, if one rode along.
    match (&payload.message_id, &payload.encrypted_content) {
        (Some(message_id), Some(encrypted_content)) => {
            info!(user_id, chat_id, message_id, "storing encrypted user message");

            let sync_entry = json!({
                "id": message_id,
                "chat_id": chat_id,
                "role": "user",
                "encrypted_content": encrypted_content,
                "encrypted_sender_name": payload.encrypted_sender_name,
                "encrypted_category": payload.encrypted_category,
                "created_at": created_at,
                "status": "synced",
            });
            if let Err(e) = state
                .cache
                .append_sync_message(user_id, chat_id, &sync_entry.to_string())
                .await
            {
                warn!(user_id, chat_id, error = %e, "sync cache append failed");
            }

            // Converge the cache versions without waiting for the
            // persistence worker: explicit messages_v + new score.
            if let Some(messages_v) = payload.versions.messages_v {
                if let Err(e) = state
                    .cache
                    .set_component(user_id, chat_id, "messages_v", messages_v)
                    .await
                {
                    warn!(user_id, chat_id, error = %e, "explicit messages_v write failed");
                }
            }
            if let Err(e) = state.cache.add_chat_to_ids(user_id, chat_id, last_edited).await {
                warn!(user_id, chat_id, error = %e, "chat list score update failed");
            }

            // Hashed user id only — the raw id never reaches a worker
            // payload; user_id rides separately for sync-cache writes.
            if let Err(e) = state
                .jobs
                .enqueue(
                    QUEUE_PERSISTENCE,
                    TASK_PERSIST_NEW_CHAT_MESSAGE,
                    json!({
                        "message_id": message_id,
                        "chat_id": chat_id,
                        "hashed_user_id": identity.user_id_hash.as_str(),
                        "role": "user",
                        "encrypted_sender_name": payload.encrypted_sender_name,
                        "encrypted_category": payload.encrypted_category,
                        "encrypted_content": encrypted_content,
                        "created_at": created_at,
                        "new_chat_messages_version": payload.versions.messages_v,
                        "new_last_edited_overall_timestamp": last_edited,
                        "encrypted_chat_key": payload.encrypted_chat_key,
                        "user_id": user_id,
                    }),
                )
                .await
            {
                error!(user_id, chat_id, error = %e, "message persistence enqueue failed");
            }
        }
        (Some(message_id), None) => warn!(
            user_id,
            chat_id, message_id, "message_id without encrypted_content, message not stored"
        ),
        (None, Some(_)) => warn!(
            user_id,
            chat_id, "encrypted_content without message_id, message not stored"
        ),
        (None, None) => {}
    }

    // Per-chat metadata blobs from preprocessing.
    let mut chat_update_fields = serde_json::Map::new();
    let mut insert = |name: &str, value: &Option<String>| {
        if let Some(value) = value {
            chat_update_fields.insert(name.to_string(), json!(value));
        }
    };
    insert("encrypted_title", &payload.encrypted_title);
    insert("encrypted_icon", &payload.encrypted_icon);
    insert("encrypted_category", &payload.encrypted_chat_category);
    insert("encrypted_chat_tags", &payload.encrypted_chat_tags);
    insert("encrypted_chat_key", &payload.encrypted_chat_key);

    if !chat_update_fields.is_empty() {
        if payload.encrypted_title.is_some() {
            if let Some(title_v) = payload.versions.title_v {
                chat_update_fields.insert("title_v".to_string(), json!(title_v));
            }
        }
        chat_update_fields.insert("updated_at".to_string(), json!(now));
        chat_update_fields.insert(
            "messages_v".to_string(),
            json!(payload.versions.messages_v.unwrap_or(1)),
        );
        chat_update_fields.insert("last_edited_overall_timestamp".to_string(), json!(last_edited));
        chat_update_fields.insert("last_message_timestamp".to_string(), json!(last_edited));

        info!(
            user_id,
            chat_id,
            fields = chat_update_fields.len(),
            "queueing encrypted chat metadata persistence"
        );
        if let Err(e) = state
            .jobs
            .enqueue(
                QUEUE_PERSISTENCE,
                TASK_PERSIST_ENCRYPTED_CHAT_METADATA,
                json!({
                    "chat_id": chat_id,
                    "fields": chat_update_fields,
                    "hashed_user_id": identity.user_id_hash.as_str(),
                }),
            )
            .await
        {
            error!(user_id, chat_id, error = %e, "metadata persistence enqueue failed");
        }
    }

    if let Some(message_id) = &payload.message_id {
        state
            .manager
            .send_personal(
                &ServerFrame::new(
                    events::CHAT_MESSAGE_CONFIRMED,
                    json!({
                        "chat_id": chat_id,
                        "message_id": message_id,
                        "status": "synced",
                    }),
                ),
                user_id,
                device,
            )
            .await;
    }

    state
        .manager
        .send_personal(
            &ServerFrame::new(
                events::ENCRYPTED_METADATA_STORED,
                json!({
                    "chat_id": chat_id,
                    "message_id": payload.message_id,
                    "status": "queued_for_storage",
                }),
            ),
            user_id,
            device,
        )
        .await;

    // A new encrypted_chat_key changes how siblings decrypt the chat
    // (hide/unhide flips the key) — they must hear about it now, not on
    // the next full sync.
    if let Some(encrypted_chat_key) = &payload.encrypted_chat_key {
        state
            .manager
            .broadcast_to_user(
                &ServerFrame::new(
                    events::ENCRYPTED_CHAT_METADATA,
                    json!({
                        "chat_id": chat_id,
                        "encrypted_chat_key": encrypted_chat_key,
                        "versions": {
                            "messages_v": payload.versions.messages_v,
                            "title_v": payload.versions.title_v,
                            "last_edited_overall_timestamp": payload.versions.last_edited_overall_timestamp,
                        },
                    }),
                ),
                user_id,
                Some(device),
            )
            .await;
        info!(user_id, chat_id, "encrypted_chat_key broadcast to sibling devices");
    }
}

/// `update_post_processing_metadata`. Unlike every other handler this one
/// propagates its failure: if the persistence wiring is broken here the
/// deployment is misconfigured and the connection should fall over loudly.
pub async fn handle_post_processing_metadata(
    state: &AppState,
    identity: &Identity,
    payload: UpdatePostProcessingMetadata,
) -> Result<()> {
    let user_id = identity.user_id.as_str();
    let device = identity.device_hash.as_str();

    let Some(chat_id) = payload.chat_id.as_deref() else {
        error!(user_id, "post-processing metadata without chat_id");
        state
            .manager
            .send_personal(
                &ServerFrame::error("Missing chat_id in post-processing metadata", None),
                user_id,
                device,
            )
            .await;
        return Ok(());
    };
    info!(user_id, chat_id, "processing post-processing metadata");

    let mut chat_update_fields = serde_json::Map::new();
    if let Some(suggestions) = &payload.encrypted_follow_up_suggestions {
        chat_update_fields.insert(
            "encrypted_follow_up_request_suggestions".to_string(),
            json!(suggestions),
        );
    }
    if let Some(summary) = &payload.encrypted_chat_summary {
        chat_update_fields.insert("encrypted_chat_summary".to_string(), json!(summary));
    }
    if let Some(tags) = &payload.encrypted_chat_tags {
        chat_update_fields.insert("encrypted_chat_tags".to_string(), json!(tags));
    }

    if !payload.encrypted_new_chat_suggestions.is_empty() {
        let suggestions: Vec<&String> =
            payload.encrypted_new_chat_suggestions.iter().take(6).collect();
        let count = suggestions.len();
        state
            .jobs
            .enqueue(
                QUEUE_PERSISTENCE,
                TASK_PERSIST_NEW_CHAT_SUGGESTIONS,
                json!({
                    "hashed_user_id": identity.user_id_hash.as_str(),
                    "chat_id": chat_id,
                    "suggestions": suggestions,
                }),
            )
            .await
            .map_err(|e| CoreError::Jobs(e.to_string()))?;
        info!(user_id, chat_id, count, "new chat suggestions queued");

        // The cached suggestion list is stale now; the next sync refetches.
        if let Err(e) = state
            .cache
            .delete_new_chat_suggestions(identity.user_id_hash.as_str())
            .await
        {
            warn!(user_id, error = %e, "suggestion cache invalidation failed");
        }
    }

    if chat_update_fields.is_empty() {
        warn!(user_id, chat_id, "no post-processing fields to update");
        return Ok(());
    }
    chat_update_fields.insert("updated_at".to_string(), json!(chrono::Utc::now().timestamp()));

    state
        .jobs
        .enqueue(
            QUEUE_PERSISTENCE,
            TASK_PERSIST_ENCRYPTED_CHAT_METADATA,
            json!({
                "chat_id": chat_id,
                "fields": chat_update_fields,
                "hashed_user_id": identity.user_id_hash.as_str(),
            }),
        )
        .await
        .map_err(|e| CoreError::Jobs(e.to_string()))?;

    state
        .manager
        .send_personal(
            &ServerFrame::new(
                events::POST_PROCESSING_METADATA_STORED,
                json!({ "chat_id": chat_id, "status": "queued_for_storage" }),
            ),
            user_id,
            device,
        )
        .await;
    info!(user_id, chat_id, "post-processing metadata queued");
    Ok(())
}
