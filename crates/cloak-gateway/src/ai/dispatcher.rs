//! Per-chat single-flight AI dispatch. At most one live task per chat;
//! later turns queue and are folded into one follow-up task when the
//! active one finishes.

use tracing::{info, warn};

use cloak_core::error::{CoreError, Result};
use cloak_core::types::TaskId;
use cloak_jobs::{QUEUE_APP_AI, TASK_ASK_SKILL};
use cloak_protocol::model::AskSkillRequest;

use crate::app::AppState;

/// What happened to a submitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A worker task was started under this id.
    Started(TaskId),
    /// An active task exists; the request was queued behind it.
    Queued { queue_len: i64 },
}

/// Submit a turn for a chat, starting a worker or queueing behind the
/// active one.
pub async fn submit(state: &AppState, request: AskSkillRequest) -> Result<SubmitOutcome> {
    let chat_id = request.chat_id.clone();

    let active = state
        .cache
        .active_task(&chat_id)
        .await
        .map_err(|e| CoreError::Cache(e.to_string()))?;
    if active.is_some() {
        let queue_len = state
            .cache
            .queue_request(&chat_id, &request)
            .await
            .map_err(|e| CoreError::Cache(e.to_string()))?;
        return Ok(SubmitOutcome::Queued { queue_len });
    }

    let task_id = TaskId::new();
    state
        .cache
        .set_active_task(&chat_id, task_id.as_str())
        .await
        .map_err(|e| CoreError::Cache(e.to_string()))?;

    let kwargs = serde_json::to_value(&request)?;
    if let Err(e) = state
        .jobs
        .enqueue_with_id(QUEUE_APP_AI, TASK_ASK_SKILL, task_id.as_str(), kwargs)
        .await
    {
        // Roll the marker back so the chat is not wedged behind a job
        // that never existed.
        if let Err(clear_err) = state.cache.clear_active_task(&chat_id).await {
            warn!(chat_id, error = %clear_err, "failed to clear task after enqueue failure");
        }
        return Err(CoreError::Jobs(e.to_string()));
    }

    info!(chat_id, task_id = %task_id, "AI task started");
    Ok(SubmitOutcome::Started(task_id))
}

/// Cancel by task id. Resolves ownership through the reverse mapping and
/// revokes the worker; the worker's final revocation-marked chunk then
/// drives the normal completion path (clear + drain).
pub async fn cancel(state: &AppState, task_id: &str) -> Result<Option<String>> {
    let chat_id = state
        .cache
        .chat_for_task(task_id)
        .await
        .map_err(|e| CoreError::Cache(e.to_string()))?;
    let Some(chat_id) = chat_id else {
        return Ok(None);
    };
    state
        .jobs
        .revoke(task_id)
        .await
        .map_err(|e| CoreError::Jobs(e.to_string()))?;
    info!(chat_id, task_id, "AI task revocation requested");
    Ok(Some(chat_id))
}

/// Completion transition, driven by the stream listener observing a final
/// chunk: clear the mapping pair, then fold any queued turns into one
/// follow-up task.
pub async fn complete(state: &AppState, chat_id: &str) -> Result<()> {
    state
        .cache
        .clear_active_task(chat_id)
        .await
        .map_err(|e| CoreError::Cache(e.to_string()))?;

    let queued = state
        .cache
        .drain_queue(chat_id)
        .await
        .map_err(|e| CoreError::Cache(e.to_string()))?;
    if let Some(merged) = merge_queued(queued) {
        info!(chat_id, "starting follow-up task from queued turns");
        Box::pin(submit(state, merged)).await?;
    }
    Ok(())
}

/// Fold queued requests into the one that will actually run. The last
/// request carries the fullest message history, so it wins; histories
/// are unioned by message id in arrival order to keep turns that only
/// earlier requests saw.
pub fn merge_queued(mut queued: Vec<AskSkillRequest>) -> Option<AskSkillRequest> {
    let mut base = queued.pop()?;
    if queued.is_empty() {
        return Some(base);
    }

    let mut merged_history = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for request in queued.iter().chain(std::iter::once(&base)) {
        for message in &request.message_history {
            let key = (message.created_at, message.content.clone());
            if seen.insert(key) {
                merged_history.push(message.clone());
            }
        }
    }
    merged_history.sort_by_key(|m| m.created_at);
    base.message_history = merged_history;
    Some(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloak_protocol::model::{AiHistoryMessage, MessageRole};

    fn request(chat_id: &str, message_id: &str, history: &[(&str, i64)]) -> AskSkillRequest {
        AskSkillRequest {
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
            user_id: "u1".to_string(),
            user_id_hash: "h1".to_string(),
            message_history: history
                .iter()
                .map(|(content, at)| AiHistoryMessage {
                    role: MessageRole::User,
                    content: content.to_string(),
                    created_at: *at,
                    sender_name: None,
                    category: None,
                })
                .collect(),
            chat_has_title: false,
            is_incognito: false,
            mate_id: None,
            active_focus_id: None,
            user_preferences: None,
            app_settings_memories_metadata: None,
            is_app_settings_memories_continuation: false,
        }
    }

    #[test]
    fn empty_queue_merges_to_none() {
        assert!(merge_queued(Vec::new()).is_none());
    }

    #[test]
    fn single_request_passes_through() {
        let merged = merge_queued(vec![request("c1", "m1", &[("hi", 1)])]).unwrap();
        assert_eq!(merged.message_id, "m1");
        assert_eq!(merged.message_history.len(), 1);
    }

    #[test]
    fn merge_unions_histories_and_keeps_last_metadata() {
        let first = request("c1", "m1", &[("hi", 1)]);
        let second = request("c1", "m2", &[("hi", 1), ("and also", 2)]);
        let merged = merge_queued(vec![first, second]).unwrap();
        assert_eq!(merged.message_id, "m2", "last request wins metadata");
        assert_eq!(merged.message_history.len(), 2, "histories deduplicated");
        assert!(merged.message_history.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }
}
