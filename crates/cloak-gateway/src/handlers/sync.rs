//! The initial synchronization handler: compute what each reconnecting
//! device is missing and hand it over in one response.

use serde_json::Value;
use std::collections::HashMap;
use tracing::{error, info, warn};

use cloak_core::error::CoreError;
use cloak_crypto::Crypto;
use cloak_protocol::events;
use cloak_protocol::frames::ServerFrame;
use cloak_protocol::messages::InitialSyncRequest;
use cloak_protocol::model::{CachedDraft, ChatListItemData};
use cloak_protocol::sync::{ChatSyncData, InitialSyncResponsePayload};
use cloak_records::Records;

use crate::app::AppState;
use crate::auth::Identity;
use crate::sync::plan::{compute_sync_plan, ChatSnapshot};

pub async fn handle_initial_sync(
    state: &AppState,
    identity: &Identity,
    payload: InitialSyncRequest,
) {
    let user_id = identity.user_id.as_str();
    let device = identity.device_hash.as_str();

    // Required-field absence answers with initial_sync_error and changes
    // no state.
    let Some(client_chat_ids) = payload.chat_ids else {
        error!(user_id, device, "initial_sync_request missing chat_ids");
        send_sync_error(
            state,
            identity,
            "Missing required field: chat_ids. Please update your client.",
        )
        .await;
        return;
    };
    if payload.chat_count.is_none() {
        error!(user_id, device, "initial_sync_request missing chat_count");
        send_sync_error(
            state,
            identity,
            "Missing required field: chat_count. Please update your client.",
        )
        .await;
        return;
    }

    let immediate = payload
        .immediate_view_chat_id
        .as_deref()
        .filter(|id| *id != "new");

    match build_response(
        state,
        identity,
        &client_chat_ids,
        &payload.chat_versions,
        immediate,
    )
    .await
    {
        Ok(response) => {
            info!(
                user_id,
                device,
                deletes = response.chat_ids_to_delete.len(),
                updates = response.chats_to_add_or_update.len(),
                order = response.server_chat_order.len(),
                "sending initial_sync_response"
            );
            state
                .manager
                .send_personal(
                    &ServerFrame::new(events::INITIAL_SYNC_RESPONSE, response),
                    user_id,
                    device,
                )
                .await;
        }
        Err(e) => {
            error!(user_id, device, error = %e, "initial sync failed");
            send_sync_error(state, identity, "Failed to perform initial synchronization.").await;
        }
    }
}

async fn send_sync_error(state: &AppState, identity: &Identity, message: &str) {
    state
        .manager
        .send_personal(
            &ServerFrame::new(
                events::INITIAL_SYNC_ERROR,
                serde_json::json!({ "message": message }),
            ),
            identity.user_id.as_str(),
            identity.device_hash.as_str(),
        )
        .await;
}

async fn build_response(
    state: &AppState,
    identity: &Identity,
    client_chat_ids: &[String],
    client_versions: &HashMap<String, cloak_protocol::sync::ClientChatVersions>,
    immediate_view_chat_id: Option<&str>,
) -> Result<InitialSyncResponsePayload, CoreError> {
    let user_id = identity.user_id.as_str();

    let server_list = state
        .cache
        .chat_ids_with_scores(user_id)
        .await
        .map_err(|e| CoreError::Cache(e.to_string()))?;

    let mut snapshots: Vec<ChatSnapshot> = Vec::with_capacity(server_list.len());
    let mut list_items: HashMap<String, ChatListItemData> = HashMap::new();
    let mut drafts: HashMap<String, CachedDraft> = HashMap::new();

    for (chat_id, score) in &server_list {
        let versions = match state.cache.chat_versions(user_id, chat_id).await {
            Ok(Some(versions)) => versions,
            Ok(None) => {
                error!(
                    user_id,
                    chat_id, "cache inconsistency: chat in master list without versions, skipping"
                );
                continue;
            }
            Err(e) => {
                error!(user_id, chat_id, error = %e, "versions read failed, skipping chat");
                continue;
            }
        };

        let list_item = match state.cache.list_item(user_id, chat_id, true).await {
            Ok(Some(item)) => item,
            Ok(None) => match reconstruct_list_item(state, user_id, chat_id).await {
                Some(item) => item,
                None => {
                    warn!(
                        user_id,
                        chat_id,
                        "list-item data missing and not reconstructable, skipping chat"
                    );
                    continue;
                }
            },
            Err(e) => {
                error!(user_id, chat_id, error = %e, "list-item read failed, skipping chat");
                continue;
            }
        };

        if let Ok(Some(draft)) = state.cache.draft(user_id, chat_id, false).await {
            drafts.insert(chat_id.clone(), draft);
        }

        let draft_v = versions.draft_version_for(user_id);
        snapshots.push(ChatSnapshot {
            chat_id: chat_id.clone(),
            last_edited_ts: *score,
            versions,
            draft_v,
        });
        list_items.insert(chat_id.clone(), list_item);
    }

    let plan = compute_sync_plan(
        &snapshots,
        client_chat_ids,
        client_versions,
        immediate_view_chat_id,
    );

    let mut chats: Vec<ChatSyncData> = Vec::with_capacity(plan.chats.len());
    let mut priority: Option<ChatSyncData> = None;

    for chat_plan in &plan.chats {
        let Some(snapshot) = snapshots.iter().find(|s| s.chat_id == chat_plan.chat_id) else {
            continue;
        };
        let item = list_items.get(&chat_plan.chat_id);

        let mut data = ChatSyncData {
            chat_id: chat_plan.chat_id.clone(),
            sync_type: chat_plan.sync_type,
            versions: snapshot.versions.clone(),
            last_edited_overall_timestamp: snapshot.last_edited_ts,
            unread_count: item.map(|i| i.unread_count).unwrap_or(0),
            title: None,
            draft_md: None,
            encrypted_chat_key: item.and_then(|i| i.encrypted_chat_key.clone()),
            encrypted_icon: item.and_then(|i| i.encrypted_icon.clone()),
            encrypted_category: item.and_then(|i| i.encrypted_category.clone()),
            pinned: item.and_then(|i| i.pinned),
            messages: None,
        };

        if chat_plan.include_title {
            if let Some(encrypted_title) = item.and_then(|i| i.title.as_deref()) {
                match state
                    .crypto
                    .decrypt_with_chat_key(&chat_plan.chat_id, encrypted_title)
                    .await
                {
                    Ok(title) => data.title = Some(title),
                    Err(e) => error!(
                        user_id,
                        chat_id = %chat_plan.chat_id,
                        error = %e,
                        "title decryption failed during initial sync"
                    ),
                }
            }
        }

        if chat_plan.include_draft {
            if let Some(encrypted_md) = drafts
                .get(&chat_plan.chat_id)
                .and_then(|d| d.encrypted_draft_md.as_deref())
            {
                match state
                    .crypto
                    .decrypt_with_user_draft_key(user_id, encrypted_md)
                    .await
                {
                    Ok(draft_md) => data.draft_md = Some(draft_md),
                    Err(e) => error!(
                        user_id,
                        chat_id = %chat_plan.chat_id,
                        error = %e,
                        "draft decryption failed during initial sync"
                    ),
                }
            }
        }

        if chat_plan.include_messages {
            data.messages = Some(fetch_messages_for_view(state, user_id, &chat_plan.chat_id).await);
        }

        if chat_plan.is_priority {
            priority = Some(data);
        } else {
            chats.push(data);
        }
    }

    // The chat the user is staring at goes first.
    if let Some(priority) = priority {
        chats.insert(0, priority);
    }

    Ok(InitialSyncResponsePayload {
        chat_ids_to_delete: plan.chat_ids_to_delete,
        chats_to_add_or_update: chats,
        server_chat_order: plan.server_chat_order,
        server_timestamp: chrono::Utc::now().timestamp(),
    })
}

/// Cold-cache fallback: rebuild list-item data from Records. Returns
/// `None` when the chat is unreconstructable; callers skip it.
async fn reconstruct_list_item(
    state: &AppState,
    user_id: &str,
    chat_id: &str,
) -> Option<ChatListItemData> {
    let chat = match state.records.chat_metadata(chat_id).await {
        Ok(Some(chat)) => chat,
        Ok(None) => return None,
        Err(e) => {
            error!(user_id, chat_id, error = %e, "records lookup failed during reconstruction");
            return None;
        }
    };
    chat.encrypted_title.as_ref()?;

    if chat.encrypted_chat_key.is_none() {
        warn!(user_id, chat_id, "reconstructed chat has no encrypted_chat_key");
    }
    let item = ChatListItemData {
        title: chat.encrypted_title.clone(),
        unread_count: chat.unread_count,
        created_at: Some(chat.created_at),
        updated_at: Some(chat.updated_at),
        encrypted_chat_key: chat.encrypted_chat_key.clone(),
        encrypted_icon: chat.encrypted_icon.clone(),
        encrypted_category: chat.encrypted_category.clone(),
        last_message_timestamp: chat.last_message_timestamp,
        pinned: chat.pinned,
        ..Default::default()
    };
    if let Err(e) = state.cache.set_list_item(user_id, chat_id, &item).await {
        warn!(user_id, chat_id, error = %e, "failed to cache reconstructed list item");
    } else {
        info!(user_id, chat_id, "reconstructed list-item data from records");
    }
    Some(item)
}

/// Messages for the immediate-view chat: sync cache first, Records as
/// fallback. A failure yields an empty list, never an aborted response.
async fn fetch_messages_for_view(state: &AppState, user_id: &str, chat_id: &str) -> Vec<Value> {
    let raw = match state.cache.sync_messages(user_id, chat_id).await {
        Ok(messages) if !messages.is_empty() => messages,
        _ => match state.records.messages_for_chat(chat_id).await {
            Ok(messages) => messages,
            Err(e) => {
                error!(user_id, chat_id, error = %e, "message fetch for immediate view failed");
                Vec::new()
            }
        },
    };
    raw.iter()
        .map(|m| serde_json::from_str(m).unwrap_or(Value::String(m.clone())))
        .collect()
}
