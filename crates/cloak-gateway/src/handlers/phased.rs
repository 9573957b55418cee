//! Phased sync trigger and the sync status probe.

use serde_json::json;
use tracing::{error, info};

use cloak_protocol::events;
use cloak_protocol::frames::ServerFrame;
use cloak_protocol::messages::{PhasedSyncRequest, SyncPhase};
use cloak_protocol::sync::SyncStatusResponse;

use crate::app::AppState;
use crate::auth::Identity;
use crate::sync::phases;

pub async fn handle_phased_sync(
    state: &AppState,
    identity: &Identity,
    payload: PhasedSyncRequest,
) {
    let user_id = identity.user_id.as_str();
    let device = identity.device_hash.as_str();
    let phase = payload.phase;
    info!(user_id, device, ?phase, "phased sync requested");

    if matches!(phase, SyncPhase::Phase1 | SyncPhase::All) {
        phases::run_phase1(state, identity).await;
    }
    if matches!(phase, SyncPhase::Phase2 | SyncPhase::All) {
        phases::run_phase2(state, identity).await;
    }
    if matches!(phase, SyncPhase::Phase3 | SyncPhase::All) {
        phases::run_phase3(state, identity).await;

        // Phase 3 succeeded: the sync caches have served their purpose
        // of seeding cold clients; later stragglers fall back to Records.
        match state.cache.clear_all_sync_messages(user_id).await {
            Ok(cleared) => info!(user_id, cleared, "sync caches cleared after phase 3"),
            Err(e) => error!(user_id, error = %e, "sync cache clear failed"),
        }
    }

    state
        .manager
        .send_personal(
            &ServerFrame::new(
                events::PHASED_SYNC_COMPLETE,
                json!({
                    "phase": phase,
                    "timestamp": chrono::Utc::now().timestamp(),
                }),
            ),
            user_id,
            device,
        )
        .await;
    info!(user_id, ?phase, "phased sync complete");
}

pub async fn handle_sync_status(state: &AppState, identity: &Identity) {
    let user_id = identity.user_id.as_str();
    let device = identity.device_hash.as_str();

    let cache_primed = match state.cache.is_cache_primed(user_id).await {
        Ok(primed) => primed,
        Err(e) => {
            error!(user_id, error = %e, "primed flag read failed");
            state
                .manager
                .send_personal(
                    &ServerFrame::error("Failed to get sync status", None),
                    user_id,
                    device,
                )
                .await;
            return;
        }
    };
    let chat_count = state.cache.chat_count(user_id).await.unwrap_or(0);

    state
        .manager
        .send_personal(
            &ServerFrame::new(
                events::SYNC_STATUS_RESPONSE,
                SyncStatusResponse {
                    cache_primed,
                    chat_count,
                    timestamp: chrono::Utc::now().timestamp(),
                },
            ),
            user_id,
            device,
        )
        .await;
    info!(user_id, cache_primed, chat_count, "sync status sent");
}
