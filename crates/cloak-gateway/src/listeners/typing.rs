//! `ai_typing_indicator_events::*` — processing-started (typing
//! indicator), post-processing results, and skill execution status. All
//! three are UI updates every device should see.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

use cloak_protocol::events;

use crate::app::AppState;
use crate::listeners::ERROR_BACKOFF;

pub async fn run(state: Arc<AppState>) -> cloak_cache::Result<()> {
    let mut subscription = state
        .cache
        .subscribe_pattern(events::AI_TYPING_INDICATOR_PATTERN)
        .await?;

    while let Some(message) = subscription.next().await {
        let Some(data) = message.data else {
            error!(channel = %message.channel, "JSON decode error on typing channel");
            continue;
        };
        if let Err(e) = handle_event(&state, &message.channel, &data).await {
            error!(channel = %message.channel, error = %e, "typing listener handler error");
            tokio::time::sleep(ERROR_BACKOFF).await;
        }
    }
    Ok(())
}

async fn handle_event(state: &AppState, channel: &str, data: &Value) -> Result<(), String> {
    let event_type = data.get("type").and_then(|t| t.as_str()).unwrap_or("");
    let event_for_client = data.get("event_for_client").and_then(|v| v.as_str());
    let user_id = data.get("user_id_uuid").and_then(|v| v.as_str());

    match event_type {
        events::EV_AI_PROCESSING_STARTED => {
            let (Some(event_for_client), Some(user_id)) = (event_for_client, user_id) else {
                warn!(channel, "malformed processing-started event");
                return Ok(());
            };
            let required = ["chat_id", "task_id", "user_message_id", "category"];
            if required.iter().any(|f| data.get(f).is_none()) {
                warn!(channel, "processing-started event missing essential fields");
                return Ok(());
            }
            let payload = json!({
                "chat_id": data.get("chat_id"),
                // the AI's message id doubles as the typing anchor
                "message_id": data.get("task_id"),
                "user_message_id": data.get("user_message_id"),
                "category": data.get("category"),
                "model_name": data.get("model_name"),
                "title": data.get("title"),
                "icon_names": data.get("icon_names").cloned().unwrap_or_else(|| json!([])),
            });
            state.manager.broadcast_event(user_id, event_for_client, payload).await;
            debug!(user_id, "typing indicator broadcast");
        }

        events::EV_POST_PROCESSING_COMPLETED => {
            let (Some(event_for_client), Some(user_id)) = (event_for_client, user_id) else {
                warn!(channel, "malformed post-processing event");
                return Ok(());
            };
            if data.get("chat_id").is_none() || data.get("task_id").is_none() {
                warn!(channel, "post-processing event missing chat_id/task_id");
                return Ok(());
            }
            let payload = json!({
                "chat_id": data.get("chat_id"),
                "task_id": data.get("task_id"),
                "follow_up_request_suggestions": data
                    .get("follow_up_request_suggestions")
                    .cloned()
                    .unwrap_or_else(|| json!([])),
                "new_chat_request_suggestions": data
                    .get("new_chat_request_suggestions")
                    .cloned()
                    .unwrap_or_else(|| json!([])),
                "chat_summary": data.get("chat_summary").cloned().unwrap_or_else(|| json!("")),
                "chat_tags": data.get("chat_tags").cloned().unwrap_or_else(|| json!([])),
                "harmful_response": data
                    .get("harmful_response")
                    .cloned()
                    .unwrap_or_else(|| json!(0.0)),
            });
            state.manager.broadcast_event(user_id, event_for_client, payload).await;
            debug!(user_id, "post-processing results broadcast");
        }

        events::EV_SKILL_EXECUTION_STATUS => {
            let (Some(event_for_client), Some(user_id)) = (event_for_client, user_id) else {
                warn!(channel, "malformed skill-status event");
                return Ok(());
            };
            let required = ["chat_id", "message_id", "task_id", "app_id", "skill_id", "status"];
            if required.iter().any(|f| data.get(f).is_none()) {
                warn!(channel, "skill-status event missing essential fields");
                return Ok(());
            }
            let mut payload = json!({
                "chat_id": data.get("chat_id"),
                "message_id": data.get("message_id"),
                "task_id": data.get("task_id"),
                "app_id": data.get("app_id"),
                "skill_id": data.get("skill_id"),
                "status": data.get("status"),
                "preview_data": data.get("preview_data").cloned().unwrap_or_else(|| json!({})),
            });
            if let Some(error) = data.get("error") {
                payload["error"] = error.clone();
            }
            state.manager.broadcast_event(user_id, event_for_client, payload).await;
            debug!(user_id, "skill execution status broadcast");
        }

        other => warn!(channel, event_type = other, "unexpected event on typing channel"),
    }
    Ok(())
}
