//! Draft updates and deletion. Drafts are user-scoped: siblings learn the
//! new version, other users of a chat never see each other's drafts.

use serde_json::json;
use tracing::{error, info, warn};

use cloak_protocol::events;
use cloak_protocol::frames::ServerFrame;
use cloak_protocol::messages::{DeleteDraft, UpdateDraft};
use cloak_records::Records;

use crate::app::AppState;
use crate::auth::Identity;

pub async fn handle_update_draft(state: &AppState, identity: &Identity, payload: UpdateDraft) {
    let user_id = identity.user_id.as_str();
    let device = identity.device_hash.as_str();
    let chat_id = payload.chat_id.as_str();

    let draft_v = match state.cache.increment_draft_version(user_id, chat_id).await {
        Ok(v) => v,
        Err(e) => {
            error!(user_id, chat_id, error = %e, "draft version bump failed");
            state
                .manager
                .send_personal(
                    &ServerFrame::error("Failed to update draft.", Some(chat_id)),
                    user_id,
                    device,
                )
                .await;
            return;
        }
    };

    if let Err(e) = state
        .cache
        .put_draft(user_id, chat_id, payload.encrypted_draft_md.as_deref(), draft_v)
        .await
    {
        error!(user_id, chat_id, error = %e, "draft content write failed");
        state
            .manager
            .send_personal(
                &ServerFrame::error("Failed to update draft.", Some(chat_id)),
                user_id,
                device,
            )
            .await;
        return;
    }

    // Sibling devices replace their local draft with the new version.
    state
        .manager
        .broadcast_to_user(
            &ServerFrame::new(
                events::DRAFT_UPDATED,
                json!({
                    "chat_id": chat_id,
                    "data": { "encrypted_draft_md": payload.encrypted_draft_md },
                    "versions": { "draft_v": draft_v },
                }),
            ),
            user_id,
            Some(device),
        )
        .await;
    info!(user_id, chat_id, draft_v, "draft updated");
}

pub async fn handle_delete_draft(state: &AppState, identity: &Identity, payload: DeleteDraft) {
    let user_id = identity.user_id.as_str();
    let device = identity.device_hash.as_str();
    let chat_id = payload.chat_id.as_str();
    info!(user_id, device, chat_id, "delete_draft requested");

    // A chat missing from Records is a new/local chat: the draft may only
    // exist client-side or in cache, and deleting it is allowed. Only an
    // existing chat owned by someone else is rejected.
    match state
        .records
        .check_chat_ownership(chat_id, identity.user_id_hash.as_str())
        .await
    {
        Ok(true) => {}
        Ok(false) => match state.records.chat_metadata(chat_id).await {
            Ok(Some(_)) => {
                warn!(user_id, chat_id, "draft delete rejected: chat owned by another user");
                state
                    .manager
                    .send_personal(
                        &ServerFrame::error(
                            "You do not have permission to modify this chat.",
                            Some(chat_id),
                        ),
                        user_id,
                        device,
                    )
                    .await;
                return;
            }
            Ok(None) => {
                // new/local chat — proceed
            }
            Err(e) => {
                error!(user_id, chat_id, error = %e, "chat existence check failed");
                state
                    .manager
                    .send_personal(
                        &ServerFrame::error(
                            "Unable to verify chat permissions. Please try again.",
                            Some(chat_id),
                        ),
                        user_id,
                        device,
                    )
                    .await;
                return;
            }
        },
        Err(e) => {
            // Ownership check failed outright; fall back to existence.
            error!(user_id, chat_id, error = %e, "ownership check failed during delete_draft");
            match state.records.chat_metadata(chat_id).await {
                Ok(None) => {} // new/local chat — proceed
                _ => {
                    state
                        .manager
                        .send_personal(
                            &ServerFrame::error(
                                "Unable to verify chat permissions. Please try again.",
                                Some(chat_id),
                            ),
                            user_id,
                            device,
                        )
                        .await;
                    return;
                }
            }
        }
    }

    match state.cache.delete_draft(user_id, chat_id).await {
        Ok(true) => info!(user_id, chat_id, "draft cache key deleted"),
        Ok(false) => info!(user_id, chat_id, "draft cache key was already absent"),
        Err(e) => warn!(user_id, chat_id, error = %e, "draft cache delete failed"),
    }
    if let Err(e) = state.cache.delete_draft_version_field(user_id, chat_id).await {
        warn!(user_id, chat_id, error = %e, "draft version field delete failed");
    }

    // Remove the persisted draft row if one exists. Absence is normal —
    // the draft may never have been synced.
    match state
        .records
        .find_draft(identity.user_id_hash.as_str(), chat_id)
        .await
    {
        Ok(Some(draft_id)) => {
            if let Err(e) = state.records.delete_draft(&draft_id).await {
                error!(user_id, chat_id, draft_id, error = %e, "records draft delete failed");
                state
                    .manager
                    .send_personal(
                        &ServerFrame::error(
                            format!("Failed to delete draft {} on server.", chat_id),
                            Some(chat_id),
                        ),
                        user_id,
                        device,
                    )
                    .await;
                return;
            }
            info!(user_id, chat_id, draft_id, "records draft deleted");
        }
        Ok(None) => info!(user_id, chat_id, "no persisted draft to delete"),
        Err(e) => warn!(user_id, chat_id, error = %e, "records draft lookup failed"),
    }

    // Always confirm and broadcast, even when nothing was persisted:
    // sibling devices may hold a local copy that must be cleared.
    state
        .manager
        .send_personal(
            &ServerFrame::new(
                events::DRAFT_DELETE_RECEIPT,
                json!({ "chat_id": chat_id, "success": true }),
            ),
            user_id,
            device,
        )
        .await;
    state
        .manager
        .broadcast_to_user(
            &ServerFrame::new(events::DRAFT_DELETED, json!({ "chat_id": chat_id })),
            user_id,
            Some(device),
        )
        .await;
    info!(user_id, chat_id, "draft_deleted broadcast to sibling devices");
}
