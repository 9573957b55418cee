//! Route one inbound frame to its handler. Small state-touch messages
//! (ping, active chat, scroll, read status) are handled inline; everything
//! else delegates to the handler modules.

use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use cloak_core::error::{CoreError, Result};
use cloak_protocol::events;
use cloak_records::Records;
use cloak_protocol::frames::ServerFrame;
use cloak_protocol::messages::ClientMessage;

use crate::app::AppState;
use crate::auth::Identity;
use crate::handlers;

/// Process one inbound text frame.
///
/// Handlers answer their own errors with error frames and return `Ok` —
/// except the post-processing metadata handler, whose failure signals
/// fatal misconfiguration and propagates to close the connection.
pub async fn handle(state: &Arc<AppState>, identity: &Identity, text: &str) -> Result<()> {
    let user_id = identity.user_id.as_str();
    let device = identity.device_hash.as_str();

    let message = match ClientMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(user_id, device, error = %e, "rejecting inbound frame");
            state
                .manager
                .send_personal(&ServerFrame::error(e.to_string(), None), user_id, device)
                .await;
            return Ok(());
        }
    };

    match message {
        ClientMessage::Ping => {
            state
                .manager
                .send_personal(&ServerFrame::bare(events::PONG), user_id, device)
                .await;
        }

        ClientMessage::SetActiveChat(payload) => {
            let chat_id = payload.chat_id.clone();
            state
                .manager
                .set_active_chat(user_id, device, chat_id.clone());
            debug!(user_id, device, active_chat = ?chat_id, "active chat set");

            // Keep the user's last-opened pointer current for Phase 1.
            // A Records failure must not fail the focus switch.
            if let Some(chat_id) = &chat_id {
                if let Err(e) = state
                    .records
                    .update_user(user_id, &json!({ "last_opened": chat_id }))
                    .await
                {
                    warn!(user_id, chat_id, error = %e, "failed to update last_opened");
                }
            }

            state
                .manager
                .send_personal(
                    &ServerFrame::new(
                        events::ACTIVE_CHAT_SET_ACK,
                        json!({ "chat_id": payload.chat_id }),
                    ),
                    user_id,
                    device,
                )
                .await;
        }

        ClientMessage::ScrollPositionUpdate(payload) => {
            if let Err(e) = state
                .cache
                .set_scroll_position(user_id, &payload.chat_id, &payload.message_id)
                .await
            {
                warn!(user_id, chat_id = %payload.chat_id, error = %e, "scroll position update failed");
            }
        }

        ClientMessage::ChatReadStatusUpdate(payload) => {
            if let Err(e) = state
                .cache
                .set_unread_count(user_id, &payload.chat_id, payload.unread_count)
                .await
            {
                warn!(user_id, chat_id = %payload.chat_id, error = %e, "read status cache update failed");
            }
            // Write through to Records immediately; badges depend on it.
            if let Err(e) = state
                .records
                .update_chat_read_status(&payload.chat_id, payload.unread_count)
                .await
            {
                warn!(user_id, chat_id = %payload.chat_id, error = %e, "read status records update failed");
            }
        }

        ClientMessage::InitialSyncRequest(payload) => {
            handlers::sync::handle_initial_sync(state, identity, payload).await;
        }
        ClientMessage::PhasedSyncRequest(payload) => {
            handlers::phased::handle_phased_sync(state, identity, payload).await;
        }
        ClientMessage::SyncStatusRequest => {
            handlers::phased::handle_sync_status(state, identity).await;
        }
        ClientMessage::UpdateDraft(payload) => {
            handlers::drafts::handle_update_draft(state, identity, payload).await;
        }
        ClientMessage::DeleteDraft(payload) => {
            handlers::drafts::handle_delete_draft(state, identity, payload).await;
        }
        ClientMessage::UpdateTitle(payload) => {
            handlers::titles::handle_update_title(state, identity, payload).await;
        }
        ClientMessage::ChatMessageAdded(payload) => {
            handlers::messages::handle_message_added(state, identity, payload).await;
        }
        ClientMessage::GetChatMessages(payload) => {
            handlers::messages::handle_get_chat_messages(state, identity, payload).await;
        }
        ClientMessage::RequestChatContentBatch(payload) => {
            handlers::messages::handle_content_batch(state, identity, payload).await;
        }
        ClientMessage::DeleteChat(payload) => {
            handlers::chats::handle_delete_chat(state, identity, payload).await;
        }
        ClientMessage::CancelAiTask(payload) => {
            handlers::ai::handle_cancel_ai_task(state, identity, payload).await;
        }
        ClientMessage::AiResponseCompleted(payload) => {
            handlers::ai::handle_ai_response_completed(state, identity, payload).await;
        }
        ClientMessage::AppSettingsMemoriesConfirmed(payload) => {
            handlers::ai::handle_app_settings_memories_confirmed(state, identity, payload).await;
        }
        ClientMessage::EncryptedChatMetadata(payload) => {
            handlers::metadata::handle_encrypted_chat_metadata(state, identity, payload).await;
        }
        ClientMessage::UpdatePostProcessingMetadata(payload) => {
            // Re-raises on failure: a broken persistence wiring here means
            // the deployment is misconfigured, not a bad request.
            handlers::metadata::handle_post_processing_metadata(state, identity, payload)
                .await
                .map_err(|e| CoreError::Internal(e.to_string()))?;
        }
    }
    Ok(())
}
