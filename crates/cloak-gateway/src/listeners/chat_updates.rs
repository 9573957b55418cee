//! `chat_updates::*` — chat-level change events (title updates and kin)
//! published by workers. The envelope is validated; `data` and `versions`
//! forward verbatim, whatever the event type carries.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

use cloak_protocol::events;

use crate::app::AppState;
use crate::listeners::ERROR_BACKOFF;

pub async fn run(state: Arc<AppState>) -> cloak_cache::Result<()> {
    let mut subscription = state
        .cache
        .subscribe_pattern(events::CHAT_UPDATES_PATTERN)
        .await?;

    while let Some(message) = subscription.next().await {
        let Some(data) = message.data else {
            error!(channel = %message.channel, "JSON decode error on chat-updates channel");
            continue;
        };
        if let Err(e) = handle_event(&state, &message.channel, &data).await {
            error!(channel = %message.channel, error = %e, "chat-updates handler error");
            tokio::time::sleep(ERROR_BACKOFF).await;
        }
    }
    Ok(())
}

async fn handle_event(state: &AppState, channel: &str, data: &Value) -> Result<(), String> {
    let event_type = data.get("type").and_then(|t| t.as_str());
    let event_for_client = data.get("event_for_client").and_then(|v| v.as_str());
    let user_id = data.get("user_id_uuid").and_then(|v| v.as_str());

    let (Some(event_type), Some(event_for_client), Some(user_id)) =
        (event_type, event_for_client, user_id)
    else {
        warn!(channel, "malformed chat-update envelope");
        return Ok(());
    };

    let payload = json!({
        "chat_id": data.get("chat_id"),
        "data": data.get("data"),
        "versions": data.get("versions"),
    });
    state.manager.broadcast_event(user_id, event_for_client, payload).await;
    debug!(user_id, event_type, event_for_client, "chat update forwarded");
    Ok(())
}
