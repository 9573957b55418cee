//! `ai_message_persisted::*` — a worker finished persisting an AI message;
//! every device learns about it as `chat_message_added`. Nested message
//! text gets the same error-sentinel rewrite as live streams.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

use cloak_protocol::events;

use crate::ai::sanitize_stream_content;
use crate::app::AppState;
use crate::listeners::ERROR_BACKOFF;

pub async fn run(state: Arc<AppState>) -> cloak_cache::Result<()> {
    let mut subscription = state
        .cache
        .subscribe_pattern(events::AI_MESSAGE_PERSISTED_PATTERN)
        .await?;

    while let Some(message) = subscription.next().await {
        let Some(data) = message.data else {
            error!(channel = %message.channel, "JSON decode error on persisted channel");
            continue;
        };
        if let Err(e) = handle_event(&state, &message.channel, data).await {
            error!(channel = %message.channel, error = %e, "persisted handler error");
            tokio::time::sleep(ERROR_BACKOFF).await;
        }
    }
    Ok(())
}

async fn handle_event(state: &AppState, channel: &str, data: Value) -> Result<(), String> {
    let event_type = data.get("type").and_then(|t| t.as_str()).unwrap_or("");
    if event_type != events::EV_AI_MESSAGE_PERSISTED {
        warn!(channel, event_type, "unexpected event on persisted channel");
        return Ok(());
    }

    let user_id = data
        .get("user_id_uuid")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let event_for_client = data
        .get("event_for_client")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let mut message = data.get("message").cloned();
    let versions = data.get("versions").cloned();
    let last_edited = data.get("last_edited_overall_timestamp").cloned();

    let (Some(user_id), Some(event_for_client), Some(message_value), Some(versions), Some(last_edited)) = (
        user_id,
        event_for_client,
        message.take(),
        versions,
        last_edited,
    ) else {
        warn!(channel, "malformed persisted-message envelope");
        return Ok(());
    };

    let mut message_value = message_value;
    rewrite_nested_text(&mut message_value);

    let payload = json!({
        "chat_id": data.get("chat_id"),
        "message": message_value,
        "versions": versions,
        "last_edited_overall_timestamp": last_edited,
    });
    state
        .manager
        .broadcast_event(&user_id, &event_for_client, payload)
        .await;
    debug!(user_id, event_for_client, "persisted message broadcast");
    Ok(())
}

/// The persisted message nests its renderable text at
/// `content.content[0].content[0].text`. Absence of the path is normal —
/// the structure varies by message kind.
fn rewrite_nested_text(message: &mut Value) {
    let Some(text) = message
        .pointer("/content/content/0/content/0/text")
        .and_then(|t| t.as_str())
    else {
        return;
    };
    let sanitized = sanitize_stream_content(text).to_string();
    if sanitized != text {
        warn!("error sentinel in persisted message, rewriting");
        if let Some(slot) = message.pointer_mut("/content/content/0/content/0/text") {
            *slot = Value::String(sanitized);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_error_text_is_rewritten() {
        let mut message = json!({
            "content": { "content": [ { "content": [ { "text": "[ERROR upstream 500]" } ] } ] }
        });
        rewrite_nested_text(&mut message);
        assert_eq!(
            message.pointer("/content/content/0/content/0/text").unwrap(),
            "chat.an_error_occured.text"
        );
    }

    #[test]
    fn clean_or_missing_text_is_untouched() {
        let mut message = json!({
            "content": { "content": [ { "content": [ { "text": "all good" } ] } ] }
        });
        rewrite_nested_text(&mut message);
        assert_eq!(
            message.pointer("/content/content/0/content/0/text").unwrap(),
            "all good"
        );

        let mut no_text = json!({ "content": {} });
        rewrite_nested_text(&mut no_text);
        assert_eq!(no_text, json!({ "content": {} }));
    }
}
