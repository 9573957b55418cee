//! `user_updates::*` — arbitrary user-scoped events (credit changes,
//! account state). The payload forwards verbatim; only the envelope is
//! validated.

use std::sync::Arc;
use tracing::{debug, error, warn};

use cloak_protocol::events;

use crate::app::AppState;

pub async fn run(state: Arc<AppState>) -> cloak_cache::Result<()> {
    let mut subscription = state
        .cache
        .subscribe_pattern(events::USER_UPDATES_PATTERN)
        .await?;

    while let Some(message) = subscription.next().await {
        let Some(data) = message.data else {
            error!(channel = %message.channel, "JSON decode error on user-updates channel");
            continue;
        };

        let event_for_client = data.get("event_for_client").and_then(|v| v.as_str());
        let user_id = data.get("user_id_uuid").and_then(|v| v.as_str());
        let (Some(event_for_client), Some(user_id)) = (event_for_client, user_id) else {
            warn!(channel = %message.channel, "malformed user-update envelope");
            continue;
        };

        let payload = data
            .get("payload")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));
        state
            .manager
            .broadcast_event(user_id, event_for_client, payload)
            .await;
        debug!(user_id, event_for_client, "user update forwarded");
    }
    Ok(())
}
