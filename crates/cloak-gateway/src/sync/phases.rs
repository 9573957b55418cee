//! Phased cache warming. Each phase loads a slice of the user's chats
//! from Records into the cache, then publishes its completion event on
//! the per-user bus channel — the cache-events listener fans the event
//! out to every device.

use serde_json::json;
use tracing::{error, info, warn};

use cloak_protocol::events;
use cloak_protocol::model::{user_draft_field, ChatListItemData, ChatVersions};
use cloak_records::{Records, WarmChatEntry};

use crate::app::AppState;
use crate::auth::Identity;

const PHASE2_CHAT_LIMIT: usize = 10;
const PHASE3_CHAT_LIMIT: usize = 100;

/// Phase 1: prime the single last-opened chat so the first paint has
/// content. The literal id "new" means the new-chat view and is a no-op.
pub async fn run_phase1(state: &AppState, identity: &Identity) {
    let user_id = identity.user_id.as_str();
    let profile = match state.records.user_profile(user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            warn!(user_id, "no user profile, skipping phase 1");
            return;
        }
        Err(e) => {
            error!(user_id, error = %e, "phase 1 profile fetch failed");
            return;
        }
    };

    let Some(last_opened) = profile.last_opened else {
        info!(user_id, "no last-opened chat, skipping phase 1");
        return;
    };
    let chat_id = last_opened
        .rsplit('/')
        .next()
        .unwrap_or(last_opened.as_str())
        .to_string();
    if chat_id == "new" {
        info!(user_id, "last-opened is the new-chat view, skipping phase 1");
        return;
    }

    if let Err(e) = warm_single_chat(state, identity, &chat_id).await {
        error!(user_id, chat_id, error = %e, "phase 1 warm failed");
        return;
    }

    publish_phase_event(
        state,
        user_id,
        events::PHASE_1_LAST_CHAT_READY,
        json!({ "chat_id": chat_id }),
    )
    .await;
    info!(user_id, chat_id, "phase 1 complete");
}

/// Phase 2: the last 10 updated chats for quick list rendering.
pub async fn run_phase2(state: &AppState, identity: &Identity) {
    let user_id = identity.user_id.as_str();
    let entries = match state
        .records
        .chats_for_warming(identity.user_id_hash.as_str(), PHASE2_CHAT_LIMIT)
        .await
    {
        Ok(entries) => entries,
        Err(e) => {
            error!(user_id, error = %e, "phase 2 warm fetch failed");
            return;
        }
    };

    let count = warm_entries(state, identity, &entries).await;
    publish_phase_event(
        state,
        user_id,
        events::PHASE_2_LAST_20_CHATS_READY,
        json!({ "chat_count": count }),
    )
    .await;
    info!(user_id, count, "phase 2 complete");
}

/// Phase 3: the last 100 updated chats plus messages for the AI hot set,
/// then the primed flag and `cache_primed`.
pub async fn run_phase3(state: &AppState, identity: &Identity) {
    let user_id = identity.user_id.as_str();
    let entries = match state
        .records
        .chats_for_warming(identity.user_id_hash.as_str(), PHASE3_CHAT_LIMIT)
        .await
    {
        Ok(entries) => entries,
        Err(e) => {
            error!(user_id, error = %e, "phase 3 warm fetch failed");
            return;
        }
    };

    let count = warm_entries(state, identity, &entries).await;

    // Messages for chats in the hot set only.
    let top_n = state.cache.policy().top_n_messages_count;
    let hot_ids = state
        .cache
        .chat_ids_range(user_id, 0, top_n as isize - 1)
        .await
        .unwrap_or_default();
    for entry in &entries {
        let chat_id = entry.chat.id.as_str();
        if !hot_ids.iter().any(|id| id == chat_id) {
            continue;
        }
        match state.records.messages_for_chat(chat_id).await {
            Ok(messages) if !messages.is_empty() => {
                if let Err(e) = state.cache.set_sync_messages(user_id, chat_id, &messages).await {
                    warn!(user_id, chat_id, error = %e, "phase 3 message warm failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(user_id, chat_id, error = %e, "phase 3 message fetch failed"),
        }
    }

    publish_phase_event(
        state,
        user_id,
        events::PHASE_3_LAST_100_CHATS_READY,
        json!({ "chat_count": count }),
    )
    .await;

    if let Err(e) = state.cache.set_cache_primed(user_id).await {
        error!(user_id, error = %e, "failed to set primed flag");
    }
    publish_phase_event(
        state,
        user_id,
        events::CACHE_PRIMED,
        json!({ "status": "full_sync_ready" }),
    )
    .await;
    info!(user_id, count, "phase 3 complete, cache primed");
}

/// Load one chat's metadata and messages into the cache.
async fn warm_single_chat(
    state: &AppState,
    identity: &Identity,
    chat_id: &str,
) -> Result<(), String> {
    let user_id = identity.user_id.as_str();
    let chat = state
        .records
        .chat_metadata(chat_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("chat {} not in records", chat_id))?;

    let entry = WarmChatEntry {
        chat,
        encrypted_draft_md: None,
        draft_v: None,
    };
    warm_entries(state, identity, std::slice::from_ref(&entry)).await;

    match state.records.messages_for_chat(chat_id).await {
        Ok(messages) if !messages.is_empty() => {
            state
                .cache
                .set_sync_messages(user_id, chat_id, &messages)
                .await
                .map_err(|e| e.to_string())?;
        }
        Ok(_) => {}
        Err(e) => warn!(user_id, chat_id, error = %e, "message warm fetch failed"),
    }
    Ok(())
}

/// Write versions, list-item data, and drafts for a warm batch. Chats
/// that cannot be cached are skipped with a warning; the batch proceeds.
async fn warm_entries(state: &AppState, identity: &Identity, entries: &[WarmChatEntry]) -> usize {
    let user_id = identity.user_id.as_str();
    let mut warmed = 0usize;
    for entry in entries {
        let chat = &entry.chat;
        let chat_id = chat.id.as_str();

        if chat.encrypted_chat_key.is_none() {
            warn!(user_id, chat_id, "warming chat without encrypted_chat_key");
        }

        let mut versions = ChatVersions {
            messages_v: chat.messages_v,
            title_v: chat.title_v,
            extra: Default::default(),
        };
        if let Some(draft_v) = entry.draft_v {
            versions.extra.insert(user_draft_field(user_id), draft_v);
        }
        if let Err(e) = state.cache.set_chat_versions(user_id, chat_id, &versions).await {
            warn!(user_id, chat_id, error = %e, "versions warm failed, skipping chat");
            continue;
        }

        let list_item = ChatListItemData {
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
        if let Err(e) = state.cache.set_list_item(user_id, chat_id, &list_item).await {
            warn!(user_id, chat_id, error = %e, "list-item warm failed");
        }

        if let Err(e) = state
            .cache
            .add_chat_to_ids(user_id, chat_id, chat.last_edited_overall_timestamp)
            .await
        {
            warn!(user_id, chat_id, error = %e, "sorted-set warm failed");
        }

        if let Some(draft_md) = &entry.encrypted_draft_md {
            if let Err(e) = state
                .cache
                .put_draft(user_id, chat_id, Some(draft_md), entry.draft_v.unwrap_or(1))
                .await
            {
                warn!(user_id, chat_id, error = %e, "draft warm failed");
            }
        }
        warmed += 1;
    }
    warmed
}

/// Publish `{event_type, payload}` on the user's cache-events channel.
async fn publish_phase_event(
    state: &AppState,
    user_id: &str,
    event_type: &str,
    payload: serde_json::Value,
) {
    let channel = events::user_cache_events_channel(user_id);
    let event = json!({ "event_type": event_type, "payload": payload });
    if let Err(e) = state.cache.publish_event(&channel, &event).await {
        error!(user_id, event_type, error = %e, "phase event publish failed");
    }
}
