use serde::{Deserialize, Serialize};

/// A chat row as persisted in the Records Store. All `encrypted_*` fields
/// are ciphertext the core never interprets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: String,
    pub hashed_user_id: String,
    #[serde(default)]
    pub encrypted_title: Option<String>,
    #[serde(default)]
    pub encrypted_chat_key: Option<String>,
    #[serde(default)]
    pub encrypted_icon: Option<String>,
    #[serde(default)]
    pub encrypted_category: Option<String>,
    #[serde(default)]
    pub messages_v: i64,
    #[serde(default)]
    pub title_v: i64,
    #[serde(default)]
    pub last_edited_overall_timestamp: i64,
    #[serde(default)]
    pub unread_count: i64,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub updated_at: i64,
    #[serde(default)]
    pub last_message_timestamp: Option<i64>,
    #[serde(default)]
    pub pinned: Option<bool>,
}

/// The slice of the user row the core consults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    /// Path or id of the chat the user last had open; drives Phase 1.
    #[serde(default)]
    pub last_opened: Option<String>,
    /// Named key id for the user's vault key at the Crypto Service.
    #[serde(default)]
    pub vault_key_id: Option<String>,
}

/// One chat prepared for phased cache warming: the chat row plus the
/// requesting user's draft, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmChatEntry {
    pub chat: ChatRecord,
    #[serde(default)]
    pub encrypted_draft_md: Option<String>,
    #[serde(default)]
    pub draft_v: Option<i64>,
}
