//! Message ingestion and retrieval: sibling rebroadcast of new messages,
//! single-chat fetch, and the batch content re-sync path.

use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{error, info, warn};

use cloak_jobs::{QUEUE_PERSISTENCE, TASK_PERSIST_NEW_CHAT_MESSAGE};
use cloak_protocol::events;
use cloak_protocol::frames::ServerFrame;
use cloak_protocol::messages::{ChatMessageAdded, GetChatMessages, RequestChatContentBatch};
use cloak_protocol::sync::{BatchChatVersions, ChatContentBatchResponse};
use cloak_records::Records;

use crate::app::AppState;
use crate::auth::Identity;

/// `chat_message_added`: persist the client-encrypted message, seed the
/// sync cache so cold siblings can catch up, and rebroadcast.
pub async fn handle_message_added(
    state: &AppState,
    identity: &Identity,
    payload: ChatMessageAdded,
) {
    let user_id = identity.user_id.as_str();
    let device = identity.device_hash.as_str();
    let chat_id = payload.chat_id.as_str();

    // Sync cache first: the cache is the fast path for other devices and
    // must not wait on the persistence queue.
    let sync_entry = json!({
        "id": payload.message_id,
        "chat_id": chat_id,
        "role": "user",
        "encrypted_content": payload.encrypted_content,
        "sender_name": payload.sender_name,
        "created_at": payload.created_at,
        "status": "synced",
    });
    if let Err(e) = state
        .cache
        .append_sync_message(user_id, chat_id, &sync_entry.to_string())
        .await
    {
        warn!(user_id, chat_id, error = %e, "sync cache append failed");
    }

    if let Err(e) = state
        .jobs
        .enqueue(
            QUEUE_PERSISTENCE,
            TASK_PERSIST_NEW_CHAT_MESSAGE,
            json!({
                "message_id": payload.message_id,
                "chat_id": chat_id,
                "hashed_user_id": identity.user_id_hash.as_str(),
                "role": "user",
                "encrypted_content": payload.encrypted_content,
                "sender_name": payload.sender_name,
                "created_at": payload.created_at,
                "user_id": user_id,
            }),
        )
        .await
    {
        error!(user_id, chat_id, error = %e, "message persistence enqueue failed");
        state
            .manager
            .send_personal(
                &ServerFrame::error(
                    format!("Error processing received message for chat {}", chat_id),
                    Some(chat_id),
                ),
                user_id,
                device,
            )
            .await;
        return;
    }

    // Sibling devices receive the payload as sent, unknown fields
    // included.
    state
        .manager
        .broadcast_to_user(
            &ServerFrame::new(events::CHAT_MESSAGE_ADDED, &payload),
            user_id,
            Some(device),
        )
        .await;
    info!(
        user_id,
        chat_id,
        message_id = %payload.message_id,
        "chat_message_added rebroadcast to siblings"
    );
}

/// `get_chat_messages`: sync cache first, Records fallback. Content stays
/// encrypted end to end.
pub async fn handle_get_chat_messages(
    state: &AppState,
    identity: &Identity,
    payload: GetChatMessages,
) {
    let user_id = identity.user_id.as_str();
    let device = identity.device_hash.as_str();
    let chat_id = payload.chat_id.as_str();
    info!(user_id, device, chat_id, "get_chat_messages");

    let raw = match state.cache.sync_messages(user_id, chat_id).await {
        Ok(messages) if !messages.is_empty() => messages,
        _ => match state.records.messages_for_chat(chat_id).await {
            Ok(messages) => messages,
            Err(e) => {
                error!(user_id, chat_id, error = %e, "message fetch failed");
                state
                    .manager
                    .send_personal(
                        &ServerFrame::error(
                            format!("Failed to retrieve messages for chat {}.", chat_id),
                            Some(chat_id),
                        ),
                        user_id,
                        device,
                    )
                    .await;
                return;
            }
        },
    };

    let messages: Vec<Value> = raw
        .iter()
        .map(|m| serde_json::from_str(m).unwrap_or(Value::String(m.clone())))
        .collect();

    // Auxiliary content referenced by the messages, when the sync copies
    // are still warm. Absence just means the client fetches on demand.
    let embeds = state
        .cache
        .sync_embeds_for_chat(chat_id)
        .await
        .unwrap_or_default();

    state
        .manager
        .send_personal(
            &ServerFrame::new(
                events::CHAT_MESSAGES_RESPONSE,
                json!({ "chat_id": chat_id, "messages": messages, "embeds": embeds }),
            ),
            user_id,
            device,
        )
        .await;
}

/// `request_chat_content_batch`: the client detected a local message
/// count behind the server's and wants the content plus authoritative
/// versions for a batch of chats.
pub async fn handle_content_batch(
    state: &AppState,
    identity: &Identity,
    payload: RequestChatContentBatch,
) {
    let user_id = identity.user_id.as_str();
    let device = identity.device_hash.as_str();

    if payload.chat_ids.is_empty() {
        warn!(user_id, device, "request_chat_content_batch with no chat_ids");
        state
            .manager
            .send_personal(
                &ServerFrame::error("No chat_ids provided in request_chat_content_batch.", None),
                user_id,
                device,
            )
            .await;
        return;
    }
    info!(
        user_id,
        device,
        chats = payload.chat_ids.len(),
        "request_chat_content_batch"
    );

    let mut messages_by_chat_id: HashMap<String, Vec<String>> = HashMap::new();
    let mut versions_by_chat_id: HashMap<String, BatchChatVersions> = HashMap::new();
    let mut errors_occurred = false;

    for chat_id in &payload.chat_ids {
        match batch_one_chat(state, identity, chat_id).await {
            Ok(Some((messages, versions))) => {
                messages_by_chat_id.insert(chat_id.clone(), messages);
                versions_by_chat_id.insert(chat_id.clone(), versions);
            }
            Ok(None) => {
                // not owned — empty list, no versions
                messages_by_chat_id.insert(chat_id.clone(), Vec::new());
            }
            Err(e) => {
                errors_occurred = true;
                error!(user_id, chat_id, error = %e, "batch fetch failed for chat");
                messages_by_chat_id.insert(chat_id.clone(), Vec::new());
            }
        }
    }

    let response = ChatContentBatchResponse {
        messages_by_chat_id,
        versions_by_chat_id,
        partial_error: errors_occurred.then_some(true),
    };
    state
        .manager
        .send_personal(
            &ServerFrame::new(events::CHAT_CONTENT_BATCH_RESPONSE, response),
            user_id,
            device,
        )
        .await;
}

async fn batch_one_chat(
    state: &AppState,
    identity: &Identity,
    chat_id: &str,
) -> Result<Option<(Vec<String>, BatchChatVersions)>, String> {
    let user_id = identity.user_id.as_str();

    let is_owner = state
        .records
        .check_chat_ownership(chat_id, identity.user_id_hash.as_str())
        .await
        .map_err(|e| e.to_string())?;
    if !is_owner {
        warn!(user_id, chat_id, "batch fetch for chat the user does not own, skipping");
        return Ok(None);
    }

    let messages = match state.cache.sync_messages(user_id, chat_id).await {
        Ok(messages) if !messages.is_empty() => messages,
        _ => state
            .records
            .messages_for_chat(chat_id)
            .await
            .map_err(|e| e.to_string())?,
    };

    let mut messages_v = match state.cache.chat_versions(user_id, chat_id).await {
        Ok(Some(versions)) => versions.messages_v,
        _ => match state.records.chat_metadata(chat_id).await {
            Ok(Some(chat)) => chat.messages_v,
            _ => 0,
        },
    };

    // Persistence may have landed messages whose version bump is still in
    // flight; the count masks that gap.
    let server_message_count = messages.len() as i64;
    messages_v = messages_v.max(server_message_count);

    Ok(Some((
        messages,
        BatchChatVersions {
            messages_v,
            server_message_count,
        },
    )))
}
