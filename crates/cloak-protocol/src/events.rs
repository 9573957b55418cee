// Well-known event names and pub/sub channel builders. Listener fan-out
// and the phased-sync publishers share these constants so publisher and
// subscriber spellings cannot drift apart.

// --- server → client frame types ---

pub const INITIAL_SYNC_RESPONSE: &str = "initial_sync_response";
pub const INITIAL_SYNC_ERROR: &str = "initial_sync_error";
pub const CHAT_MESSAGES_RESPONSE: &str = "chat_messages_response";
pub const CHAT_CONTENT_BATCH_RESPONSE: &str = "chat_content_batch_response";
pub const ACTIVE_CHAT_SET_ACK: &str = "active_chat_set_ack";
pub const AI_RESPONSE_STORAGE_CONFIRMED: &str = "ai_response_storage_confirmed";
pub const ENCRYPTED_METADATA_STORED: &str = "encrypted_metadata_stored";
pub const POST_PROCESSING_METADATA_STORED: &str = "post_processing_metadata_stored";
pub const CHAT_MESSAGE_CONFIRMED: &str = "chat_message_confirmed";
pub const CHAT_MESSAGE_ADDED: &str = "chat_message_added";
pub const DRAFT_DELETE_RECEIPT: &str = "draft_delete_receipt";
pub const DRAFT_DELETED: &str = "draft_deleted";
pub const DRAFT_UPDATED: &str = "draft_updated";
pub const CHAT_DELETED: &str = "chat_deleted";
pub const CHAT_TITLE_UPDATED: &str = "chat_title_updated";
pub const ENCRYPTED_CHAT_METADATA: &str = "encrypted_chat_metadata";
pub const AI_MESSAGE_UPDATE: &str = "ai_message_update";
pub const AI_BACKGROUND_RESPONSE_COMPLETED: &str = "ai_background_response_completed";
pub const AI_TYPING_STARTED: &str = "ai_typing_started";
pub const AI_TYPING_ENDED: &str = "ai_typing_ended";
pub const POST_PROCESSING_COMPLETED: &str = "post_processing_completed";
pub const SKILL_EXECUTION_STATUS: &str = "skill_execution_status";
pub const SYNC_STATUS_RESPONSE: &str = "sync_status_response";
pub const PHASED_SYNC_COMPLETE: &str = "phased_sync_complete";
pub const REQUEST_APP_SETTINGS_MEMORIES: &str = "request_app_settings_memories";
pub const PONG: &str = "pong";
pub const ERROR: &str = "error";

// Phase completion events. Phase 2 delivers the last 10 updated chats but
// keeps the client-facing "_20_" spelling for wire compatibility.
pub const PHASE_1_LAST_CHAT_READY: &str = "phase_1_last_chat_ready";
pub const PHASE_2_LAST_20_CHATS_READY: &str = "phase_2_last_20_chats_ready";
pub const PHASE_3_LAST_100_CHATS_READY: &str = "phase_3_last_100_chats_ready";
pub const CACHE_PRIMED: &str = "cache_primed";

// --- internal event types carried on the bus ---

pub const EV_AI_MESSAGE_CHUNK: &str = "ai_message_chunk";
pub const EV_AI_PROCESSING_STARTED: &str = "ai_processing_started_event";
pub const EV_POST_PROCESSING_COMPLETED: &str = "post_processing_completed";
pub const EV_SKILL_EXECUTION_STATUS: &str = "skill_execution_status";
pub const EV_AI_MESSAGE_PERSISTED: &str = "ai_message_persisted";
pub const EV_SEND_APP_SETTINGS_MEMORIES_REQUEST: &str = "send_app_settings_memories_request";

// --- pub/sub channels ---

pub const USER_CACHE_EVENTS_PATTERN: &str = "user_cache_events:*";
pub const CHAT_STREAM_PATTERN: &str = "chat_stream::*";
pub const AI_TYPING_INDICATOR_PATTERN: &str = "ai_typing_indicator_events::*";
pub const CHAT_UPDATES_PATTERN: &str = "chat_updates::*";
pub const AI_MESSAGE_PERSISTED_PATTERN: &str = "ai_message_persisted::*";
pub const USER_UPDATES_PATTERN: &str = "user_updates::*";

pub fn user_cache_events_channel(user_id: &str) -> String {
    format!("user_cache_events:{}", user_id)
}

pub fn chat_stream_channel(chat_id: &str) -> String {
    format!("chat_stream::{}", chat_id)
}

pub fn ai_typing_indicator_channel(user_id_hash: &str) -> String {
    format!("ai_typing_indicator_events::{}", user_id_hash)
}

pub fn chat_updates_channel(user_id_hash: &str) -> String {
    format!("chat_updates::{}", user_id_hash)
}

pub fn ai_message_persisted_channel(user_id_hash: &str) -> String {
    format!("ai_message_persisted::{}", user_id_hash)
}

pub fn user_updates_channel(user_id_hash: &str) -> String {
    format!("user_updates::{}", user_id_hash)
}

/// Extract the suffix a channel carries past its prefix, e.g. the user id
/// from `user_cache_events:{user_id}`.
pub fn channel_suffix<'a>(channel: &'a str, separator: &str) -> Option<&'a str> {
    channel.split_once(separator).map(|(_, rest)| rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_builders_match_patterns() {
        assert!(user_cache_events_channel("u1").starts_with("user_cache_events:"));
        assert!(chat_stream_channel("c1").starts_with("chat_stream::"));
        assert_eq!(channel_suffix("user_cache_events:u1", ":"), Some("u1"));
        assert_eq!(channel_suffix("chat_stream::c-2", "::"), Some("c-2"));
        assert_eq!(channel_suffix("noseparator", "::"), None);
    }
}
