//! `user_cache_events:*` — phase completions, the primed signal, and the
//! permission request that suspends an AI task.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use cloak_protocol::events;

use crate::app::AppState;
use crate::listeners::ERROR_BACKOFF;

pub async fn run(state: Arc<AppState>) -> cloak_cache::Result<()> {
    let mut subscription = state
        .cache
        .subscribe_pattern(events::USER_CACHE_EVENTS_PATTERN)
        .await?;

    while let Some(message) = subscription.next().await {
        let Some(data) = message.data else {
            error!(channel = %message.channel, "JSON decode error on cache-events channel");
            continue;
        };
        let Some(user_id) = events::channel_suffix(&message.channel, ":").map(str::to_string)
        else {
            warn!(channel = %message.channel, "could not parse user id from channel");
            continue;
        };
        if let Err(e) = handle_event(&state, &user_id, &data).await {
            error!(user_id, error = %e, "cache-events handler error");
            tokio::time::sleep(ERROR_BACKOFF).await;
        }
    }
    Ok(())
}

async fn handle_event(state: &AppState, user_id: &str, data: &Value) -> Result<(), String> {
    let event_type = data.get("event_type").and_then(|t| t.as_str()).unwrap_or("");
    let payload = data.get("payload").cloned().unwrap_or(Value::Null);

    match event_type {
        events::PHASE_1_LAST_CHAT_READY
        | events::PHASE_2_LAST_20_CHATS_READY
        | events::PHASE_3_LAST_100_CHATS_READY
        | events::CACHE_PRIMED => {
            state.manager.broadcast_event(user_id, event_type, payload).await;
            info!(user_id, event_type, "phase event forwarded");
        }

        events::EV_SEND_APP_SETTINGS_MEMORIES_REQUEST => {
            let request_id = payload.get("request_id").and_then(|v| v.as_str());
            let requested_keys = payload.get("requested_keys").cloned();
            let (Some(request_id), Some(requested_keys)) = (request_id, requested_keys) else {
                warn!(user_id, "malformed permission request event");
                return Ok(());
            };

            // Workers may attach the minimal continuation context for the
            // core to stage; workers that stored it themselves omit it.
            if let Some(context) = payload.get("context") {
                match serde_json::from_value::<cloak_protocol::model::PendingPermissionRequest>(
                    context.clone(),
                ) {
                    Ok(context) => {
                        if let Err(e) = state
                            .cache
                            .store_pending_request(&context.chat_id, &context)
                            .await
                        {
                            error!(user_id, error = %e, "failed to stage pending request context");
                        }
                    }
                    Err(e) => warn!(user_id, error = %e, "unparsable pending request context"),
                }
            }

            // The confirmation dialog goes to one device, not all of
            // them: the first available.
            let devices = state.manager.connections_for_user(user_id);
            let Some(device) = devices.first() else {
                warn!(user_id, request_id, "no connected device for permission request");
                return Ok(());
            };
            state
                .manager
                .send_personal(
                    &cloak_protocol::frames::ServerFrame::new(
                        events::REQUEST_APP_SETTINGS_MEMORIES,
                        json!({
                            "request_id": request_id,
                            "requested_keys": requested_keys,
                        }),
                    ),
                    user_id,
                    device,
                )
                .await;
            info!(user_id, request_id, device, "permission request sent to device");
        }

        other => warn!(user_id, event_type = other, "unknown cache event type"),
    }
    Ok(())
}
