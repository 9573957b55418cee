//! AI lifecycle handlers: cancellation, the client-encrypted response
//! write path, and the permission-request continuation.

use serde_json::{json, Value};
use tracing::{error, info, warn};

use cloak_crypto::Crypto;
use cloak_jobs::{QUEUE_PERSISTENCE, TASK_PERSIST_AI_RESPONSE};
use cloak_protocol::events;
use cloak_protocol::frames::ServerFrame;
use cloak_protocol::messages::{
    AiResponseCompleted, AppSettingsMemoriesConfirmed, CancelAiTask,
};
use cloak_protocol::model::{AiHistoryMessage, AskSkillRequest, MessageRole};
use cloak_records::Records;

use crate::ai::dispatcher;
use crate::app::AppState;
use crate::auth::Identity;

/// `cancel_ai_task`: resolve ownership through the reverse mapping and
/// revoke the worker. The worker's final revocation-marked chunk drives
/// the clear-and-drain on the stream listener.
pub async fn handle_cancel_ai_task(state: &AppState, identity: &Identity, payload: CancelAiTask) {
    let user_id = identity.user_id.as_str();
    let device = identity.device_hash.as_str();
    let task_id = payload.task_id.as_str();

    match dispatcher::cancel(state, task_id).await {
        Ok(Some(chat_id)) => {
            info!(user_id, task_id, chat_id, "AI task cancellation requested");
        }
        Ok(None) => {
            warn!(user_id, task_id, "cancel for unknown or finished task");
            state
                .manager
                .send_personal(
                    &ServerFrame::error(
                        format!("No active task found for task_id {}", task_id),
                        None,
                    ),
                    user_id,
                    device,
                )
                .await;
        }
        Err(e) => {
            error!(user_id, task_id, error = %e, "cancellation failed");
            state
                .manager
                .send_personal(
                    &ServerFrame::error("Failed to cancel AI task", None),
                    user_id,
                    device,
                )
                .await;
        }
    }
}

/// `ai_response_completed`: the client encrypted the finished assistant
/// turn; the server stores ciphertext only and never encrypts assistant
/// content itself.
pub async fn handle_ai_response_completed(
    state: &AppState,
    identity: &Identity,
    payload: AiResponseCompleted,
) {
    let user_id = identity.user_id.as_str();
    let device = identity.device_hash.as_str();

    let (Some(chat_id), Some(message)) = (payload.chat_id.as_deref(), payload.message.as_ref())
    else {
        error!(user_id, device, "invalid AI response payload structure");
        state
            .manager
            .send_personal(
                &ServerFrame::error("Invalid AI response payload structure", None),
                user_id,
                device,
            )
            .await;
        return;
    };

    let (Some(message_id), Some(role), Some(encrypted_content), Some(created_at)) = (
        message.message_id.as_deref(),
        message.role.as_deref(),
        message.encrypted_content.as_deref(),
        message.created_at,
    ) else {
        error!(user_id, chat_id, "missing required fields in AI response");
        state
            .manager
            .send_personal(
                &ServerFrame::error("Missing required fields in AI response", Some(chat_id)),
                user_id,
                device,
            )
            .await;
        return;
    };

    if role != "assistant" {
        error!(user_id, chat_id, role, "AI response with non-assistant role");
        state
            .manager
            .send_personal(
                &ServerFrame::error("Invalid role for AI response", Some(chat_id)),
                user_id,
                device,
            )
            .await;
        return;
    }

    // Zero-knowledge enforcement: a stray plaintext field is dropped, the
    // encrypted payload alone proceeds.
    if message.content.is_some() {
        warn!(user_id, chat_id, "stripping plaintext content from AI response");
    }

    info!(user_id, chat_id, message_id, "persisting completed AI response");

    let mut message_data = json!({
        "message_id": message_id,
        "chat_id": chat_id,
        "role": role,
        "encrypted_content": encrypted_content,
        "created_at": created_at,
        "status": "synced",
    });
    let fields = message_data.as_object_mut().expect("literal object");
    if let Some(v) = &message.encrypted_sender_name {
        fields.insert("encrypted_sender_name".to_string(), json!(v));
    }
    if let Some(v) = &message.encrypted_category {
        fields.insert("encrypted_category".to_string(), json!(v));
    }
    if let Some(v) = &message.encrypted_model_name {
        fields.insert("encrypted_model_name".to_string(), json!(v));
    }
    if let Some(v) = &message.user_message_id {
        fields.insert("user_message_id".to_string(), json!(v));
    }

    // Seed the sync cache so sibling devices can replay the turn without
    // waiting for persistence.
    let sync_entry = json!({
        "id": message_id,
        "chat_id": chat_id,
        "role": "assistant",
        "encrypted_content": encrypted_content,
        "created_at": created_at,
        "status": "synced",
    });
    if let Err(e) = state
        .cache
        .append_sync_message(user_id, chat_id, &sync_entry.to_string())
        .await
    {
        warn!(user_id, chat_id, error = %e, "sync cache append failed for AI response");
    }

    // Versions ride along for multi-device dedup at persistence time.
    let task_id = match state
        .jobs
        .enqueue(
            QUEUE_PERSISTENCE,
            TASK_PERSIST_AI_RESPONSE,
            json!({
                "user_id": user_id,
                "hashed_user_id": identity.user_id_hash.as_str(),
                "message": message_data,
                "versions": payload.versions,
            }),
        )
        .await
    {
        Ok(task_id) => task_id,
        Err(e) => {
            error!(user_id, chat_id, error = %e, "AI response persistence enqueue failed");
            state
                .manager
                .send_personal(
                    &ServerFrame::error("Failed to process AI response completion", Some(chat_id)),
                    user_id,
                    device,
                )
                .await;
            return;
        }
    };

    state
        .manager
        .send_personal(
            &ServerFrame::new(
                events::AI_RESPONSE_STORAGE_CONFIRMED,
                json!({
                    "message_id": message_id,
                    "chat_id": chat_id,
                    "task_id": task_id,
                }),
            ),
            user_id,
            device,
        )
        .await;
}

/// `app_settings_memories_confirmed`: the user released (or refused)
/// settings/memories the AI asked for. Confirmed entries are re-encrypted
/// under the user's vault key and cached, then the original turn is
/// re-submitted as a continuation.
pub async fn handle_app_settings_memories_confirmed(
    state: &AppState,
    identity: &Identity,
    payload: AppSettingsMemoriesConfirmed,
) {
    let user_id = identity.user_id.as_str();

    let Some(chat_id) = payload.chat_id.as_deref() else {
        warn!(user_id, "app settings confirmation without chat_id");
        return;
    };

    // An empty list is a rejection: processing continues without data.
    let is_rejection = payload.app_settings_memories.is_empty();
    if is_rejection {
        info!(user_id, chat_id, "all app settings/memories rejected, continuing without data");
    } else if let Err(e) = cache_confirmed_entries(state, identity, chat_id, &payload).await {
        error!(user_id, chat_id, error = %e, "failed to cache confirmed entries");
        // Continuation still runs: the worker treats missing cache
        // entries like a rejection rather than stalling the chat.
    }

    if let Err(e) = trigger_continuation(state, identity, chat_id, is_rejection).await {
        error!(user_id, chat_id, error = %e, "continuation failed");
    }
}

async fn cache_confirmed_entries(
    state: &AppState,
    identity: &Identity,
    chat_id: &str,
    payload: &AppSettingsMemoriesConfirmed,
) -> Result<usize, String> {
    let user_id = identity.user_id.as_str();

    let vault_key_id = user_vault_key(state, user_id).await?;

    // Multiple entries can share one category (`app_id:item_key`);
    // aggregate them into a single cache entry holding the content array.
    let mut by_category: std::collections::BTreeMap<(String, String), Vec<Value>> =
        Default::default();
    for item in &payload.app_settings_memories {
        let (Some(app_id), Some(item_key), Some(content)) =
            (&item.app_id, &item.item_key, &item.content)
        else {
            warn!(user_id, chat_id, "invalid app settings item, missing fields");
            continue;
        };
        by_category
            .entry((app_id.clone(), item_key.clone()))
            .or_default()
            .push(content.clone());
    }

    let mut cached = 0usize;
    for ((app_id, item_key), contents) in &by_category {
        let aggregated = serde_json::to_string(contents).map_err(|e| e.to_string())?;
        let (encrypted_content, _) = state
            .crypto
            .encrypt_with_key(&vault_key_id, &aggregated)
            .await
            .map_err(|e| e.to_string())?;

        let cache_data = json!({
            "app_id": app_id,
            "item_key": item_key,
            "content": encrypted_content,
            "entry_count": contents.len(),
            "cached_at": chrono::Utc::now().timestamp(),
        });
        match state
            .cache
            .put_app_settings(chat_id, app_id, item_key, &cache_data)
            .await
        {
            Ok(()) => {
                cached += 1;
                info!(
                    user_id,
                    chat_id,
                    app_id,
                    item_key,
                    entries = contents.len(),
                    "app settings/memories category cached"
                );
            }
            Err(e) => warn!(user_id, chat_id, app_id, item_key, error = %e, "category cache failed"),
        }
    }
    Ok(cached)
}

/// Re-submit the original user turn now that the requested data is in
/// cache (or known to be refused). The message history is rebuilt from
/// the AI cache — the pending blob deliberately never carried it.
async fn trigger_continuation(
    state: &AppState,
    identity: &Identity,
    chat_id: &str,
    is_rejection: bool,
) -> Result<(), String> {
    let user_id = identity.user_id.as_str();

    let Some(pending) = state
        .cache
        .pending_request(chat_id)
        .await
        .map_err(|e| e.to_string())?
    else {
        warn!(user_id, chat_id, "no pending permission request, nothing to continue");
        return Ok(());
    };
    info!(
        user_id,
        chat_id,
        request_id = %pending.request_id,
        original_task = %pending.task_id,
        is_rejection,
        "continuing after permission response"
    );

    let cached_messages = state
        .cache
        .ai_messages(user_id, chat_id)
        .await
        .map_err(|e| e.to_string())?;
    if cached_messages.is_empty() {
        state
            .cache
            .delete_pending_request(chat_id)
            .await
            .map_err(|e| e.to_string())?;
        return Err("no cached messages to rebuild history from".to_string());
    }

    let vault_key_id = user_vault_key(state, user_id).await?;

    // Newest-first in cache; continuation wants chronological order.
    let mut message_history: Vec<AiHistoryMessage> = Vec::new();
    for raw in cached_messages.iter().rev() {
        let Ok(entry) = serde_json::from_str::<Value>(raw) else {
            warn!(user_id, chat_id, "unparsable AI cache entry skipped");
            continue;
        };
        let role = match entry.get("role").and_then(|r| r.as_str()) {
            Some("user") => MessageRole::User,
            Some("assistant") => MessageRole::Assistant,
            _ => continue,
        };
        let Some(encrypted_content) = entry.get("encrypted_content").and_then(|c| c.as_str())
        else {
            continue;
        };
        let content = match state
            .crypto
            .decrypt_with_key(&vault_key_id, encrypted_content)
            .await
        {
            Ok(content) => content,
            Err(e) => {
                warn!(user_id, chat_id, error = %e, "cached message decryption failed, skipped");
                continue;
            }
        };
        message_history.push(AiHistoryMessage {
            role,
            content,
            created_at: entry
                .get("created_at")
                .and_then(|t| t.as_i64())
                .unwrap_or_else(|| chrono::Utc::now().timestamp()),
            sender_name: entry
                .get("sender_name")
                .and_then(|s| s.as_str())
                .map(str::to_string),
            category: entry
                .get("category")
                .and_then(|c| c.as_str())
                .map(str::to_string),
        });
    }

    if message_history.is_empty() {
        state
            .cache
            .delete_pending_request(chat_id)
            .await
            .map_err(|e| e.to_string())?;
        return Err("no usable messages in cached history".to_string());
    }
    info!(
        user_id,
        chat_id,
        messages = message_history.len(),
        "history rebuilt from AI cache"
    );

    state
        .cache
        .delete_pending_request(chat_id)
        .await
        .map_err(|e| e.to_string())?;

    // Advertise only what actually landed in the cache, keyed the way the
    // preprocessor expects (`app_id-item_key`). A confirmed category that
    // failed to cache behaves like a rejection for that key.
    let metadata: Option<Vec<String>> = if is_rejection {
        None
    } else {
        let staged = state
            .cache
            .app_settings_batch(chat_id, &pending.requested_keys)
            .await
            .map_err(|e| e.to_string())?;
        let keys: Vec<String> = pending
            .requested_keys
            .iter()
            .filter(|key| staged.contains_key(*key))
            .map(|key| key.replacen(':', "-", 1))
            .collect();
        (!keys.is_empty()).then_some(keys)
    };

    let request = AskSkillRequest {
        chat_id: chat_id.to_string(),
        message_id: pending.message_id.clone(),
        user_id: user_id.to_string(),
        user_id_hash: pending.user_id_hash.clone(),
        message_history,
        chat_has_title: pending.chat_has_title,
        is_incognito: pending.is_incognito,
        mate_id: pending.mate_id.clone(),
        active_focus_id: pending.active_focus_id.clone(),
        user_preferences: None,
        app_settings_memories_metadata: metadata,
        is_app_settings_memories_continuation: true,
    };

    dispatcher::submit(state, request)
        .await
        .map(|outcome| {
            info!(user_id, chat_id, ?outcome, "continuation submitted");
        })
        .map_err(|e| e.to_string())
}

async fn user_vault_key(state: &AppState, user_id: &str) -> Result<String, String> {
    match state.records.user_profile(user_id).await {
        Ok(Some(profile)) => Ok(profile
            .vault_key_id
            .unwrap_or_else(|| state.config.crypto.ai_inference_key_id.clone())),
        Ok(None) => Err(format!("no profile for user {}", user_id)),
        Err(e) => Err(e.to_string()),
    }
}
