use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::model::ChatVersions;

/// Component versions a client reports for one locally stored chat.
/// Missing components compare as -1 so any server version wins.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientChatVersions {
    pub messages_v: Option<i64>,
    pub title_v: Option<i64>,
    pub draft_v: Option<i64>,
}

/// How a chat entered the sync delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncChatType {
    NewChat,
    UpdatedChat,
}

/// One chat's entry in `initial_sync_response.chats_to_add_or_update`.
/// Titles and drafts travel decrypted (transport to the owner's own
/// authenticated device); message lists stay client-encrypted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSyncData {
    pub chat_id: String,
    #[serde(rename = "type")]
    pub sync_type: SyncChatType,
    pub versions: ChatVersions,
    pub last_edited_overall_timestamp: i64,
    #[serde(default)]
    pub unread_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_md: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_chat_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    /// Present only for the immediate-view chat.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Value>>,
}

/// Payload of `initial_sync_response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialSyncResponsePayload {
    pub chat_ids_to_delete: Vec<String>,
    pub chats_to_add_or_update: Vec<ChatSyncData>,
    /// Full chat-id list in recency order, the client's authoritative sort.
    pub server_chat_order: Vec<String>,
    pub server_timestamp: i64,
}

/// Per-chat version block in `chat_content_batch_response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchChatVersions {
    pub messages_v: i64,
    pub server_message_count: i64,
}

/// Payload of `chat_content_batch_response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatContentBatchResponse {
    /// Chat id → JSON-serialized client-encrypted message strings.
    pub messages_by_chat_id: HashMap<String, Vec<String>>,
    pub versions_by_chat_id: HashMap<String, BatchChatVersions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_error: Option<bool>,
}

/// Payload of `sync_status_response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatusResponse {
    pub cache_primed: bool,
    pub chat_count: usize,
    pub timestamp: i64,
}
