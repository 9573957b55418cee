use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Who authored a cached message. The only field of message content the
/// core ever inspects semantically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// Delivery state of a message as tracked across devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Error,
    Streaming,
    Delivered,
    Synced,
}

/// A message as stored in the server-side caches. Content is opaque
/// ciphertext — vault-encrypted in the AI cache, client-encrypted in the
/// sync cache; the record shape is identical.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedMessage {
    pub id: String,
    pub chat_id: String,
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub encrypted_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    pub status: MessageStatus,
    /// Unix seconds.
    pub created_at: i64,
}

/// Dynamic per-user draft version field name inside the versions hash.
pub fn user_draft_field(user_id: &str) -> String {
    format!("user_draft_v:{}", user_id)
}

/// Component versions for a chat. `messages_v` and `title_v` always exist;
/// per-user draft versions appear as dynamic `user_draft_v:{user_id}`
/// fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatVersions {
    pub messages_v: i64,
    pub title_v: i64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, i64>,
}

impl ChatVersions {
    pub fn draft_version_for(&self, user_id: &str) -> Option<i64> {
        self.extra.get(&user_draft_field(user_id)).copied()
    }

    /// Parse an HGETALL result. Returns `None` when the hash is empty.
    /// Unparsable fields are dropped rather than failing the whole read.
    pub fn from_fields(fields: &std::collections::HashMap<String, String>) -> Option<Self> {
        if fields.is_empty() {
            return None;
        }
        let mut versions = ChatVersions::default();
        for (name, value) in fields {
            let Ok(parsed) = value.parse::<i64>() else {
                continue;
            };
            match name.as_str() {
                "messages_v" => versions.messages_v = parsed,
                "title_v" => versions.title_v = parsed,
                other => {
                    versions.extra.insert(other.to_string(), parsed);
                }
            }
        }
        Some(versions)
    }
}

/// Per-chat list-item fields. All `encrypted_*` values and the title are
/// ciphertext the core never interprets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatListItemData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub unread_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_chat_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_chat_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_chat_tags: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_follow_up_request_suggestions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_active_focus_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pinned: Option<bool>,
    /// Scroll anchor: id of the last message visible on screen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_visible_message_id: Option<String>,
}

impl ChatListItemData {
    /// Flatten into string fields for an HSET. Booleans become "0"/"1"
    /// because hash values must be scalar.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = Vec::new();
        let mut push = |name: &str, value: Option<String>| {
            if let Some(v) = value {
                fields.push((name.to_string(), v));
            }
        };
        push("title", self.title.clone());
        push("unread_count", Some(self.unread_count.to_string()));
        push("created_at", self.created_at.map(|v| v.to_string()));
        push("updated_at", self.updated_at.map(|v| v.to_string()));
        push("encrypted_chat_key", self.encrypted_chat_key.clone());
        push("encrypted_icon", self.encrypted_icon.clone());
        push("encrypted_category", self.encrypted_category.clone());
        push("encrypted_chat_summary", self.encrypted_chat_summary.clone());
        push("encrypted_chat_tags", self.encrypted_chat_tags.clone());
        push(
            "encrypted_follow_up_request_suggestions",
            self.encrypted_follow_up_request_suggestions.clone(),
        );
        push(
            "encrypted_active_focus_id",
            self.encrypted_active_focus_id.clone(),
        );
        push(
            "last_message_timestamp",
            self.last_message_timestamp.map(|v| v.to_string()),
        );
        push(
            "pinned",
            self.pinned.map(|v| if v { "1" } else { "0" }.to_string()),
        );
        push(
            "last_visible_message_id",
            self.last_visible_message_id.clone(),
        );
        fields
    }

    /// Rebuild from an HGETALL result. Unknown fields are ignored so the
    /// hash can grow without breaking old readers.
    pub fn from_fields(fields: &std::collections::HashMap<String, String>) -> Option<Self> {
        if fields.is_empty() {
            return None;
        }
        let mut data = ChatListItemData::default();
        for (name, value) in fields {
            match name.as_str() {
                "title" => data.title = Some(value.clone()),
                "unread_count" => data.unread_count = value.parse().unwrap_or(0),
                "created_at" => data.created_at = value.parse().ok(),
                "updated_at" => data.updated_at = value.parse().ok(),
                "encrypted_chat_key" => data.encrypted_chat_key = Some(value.clone()),
                "encrypted_icon" => data.encrypted_icon = Some(value.clone()),
                "encrypted_category" => data.encrypted_category = Some(value.clone()),
                "encrypted_chat_summary" => data.encrypted_chat_summary = Some(value.clone()),
                "encrypted_chat_tags" => data.encrypted_chat_tags = Some(value.clone()),
                "encrypted_follow_up_request_suggestions" => {
                    data.encrypted_follow_up_request_suggestions = Some(value.clone())
                }
                "encrypted_active_focus_id" => {
                    data.encrypted_active_focus_id = Some(value.clone())
                }
                "last_message_timestamp" => data.last_message_timestamp = value.parse().ok(),
                "pinned" => data.pinned = Some(value == "1" || value == "true"),
                "last_visible_message_id" => {
                    data.last_visible_message_id = Some(value.clone())
                }
                _ => {}
            }
        }
        Some(data)
    }
}

/// A user's draft for one chat. `encrypted_draft_md` is stored as the
/// literal string "null" when the draft content was cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedDraft {
    pub encrypted_draft_md: Option<String>,
    pub draft_v: i64,
}

/// A plaintext message as handed to the AI worker after server-side
/// decryption of the AI cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiHistoryMessage {
    pub role: MessageRole,
    pub content: String,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// The work order handed to the AI worker — both for fresh turns and for
/// continuations after a permission confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskSkillRequest {
    pub chat_id: String,
    pub message_id: String,
    pub user_id: String,
    pub user_id_hash: String,
    pub message_history: Vec<AiHistoryMessage>,
    #[serde(default)]
    pub chat_has_title: bool,
    #[serde(default)]
    pub is_incognito: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_focus_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_preferences: Option<Value>,
    /// Available app-settings/memories keys in `app_id-item_key` form, so
    /// the preprocessor knows what is already staged in cache.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_settings_memories_metadata: Option<Vec<String>>,
    /// Set on the re-run spawned after a permission confirmation so the
    /// worker does not store a second pending request on a cache miss.
    #[serde(default)]
    pub is_app_settings_memories_continuation: bool,
}

/// Minimal context stored while an AI task is suspended waiting for the
/// user to release settings/memories. Deliberately excludes the message
/// history — that is rebuilt from the AI cache on continuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingPermissionRequest {
    pub request_id: String,
    pub chat_id: String,
    pub message_id: String,
    pub user_id: String,
    pub user_id_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mate_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_focus_id: Option<String>,
    #[serde(default)]
    pub chat_has_title: bool,
    #[serde(default)]
    pub is_incognito: bool,
    /// Keys that were requested, in `app_id:item_key` form.
    pub requested_keys: Vec<String>,
    pub task_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn versions_round_trip_through_hash_fields() {
        let mut fields = HashMap::new();
        fields.insert("messages_v".to_string(), "7".to_string());
        fields.insert("title_v".to_string(), "2".to_string());
        fields.insert("user_draft_v:u-9".to_string(), "4".to_string());
        let versions = ChatVersions::from_fields(&fields).expect("non-empty hash");
        assert_eq!(versions.messages_v, 7);
        assert_eq!(versions.title_v, 2);
        assert_eq!(versions.draft_version_for("u-9"), Some(4));
        assert_eq!(versions.draft_version_for("u-other"), None);
    }

    #[test]
    fn versions_empty_hash_is_none() {
        assert!(ChatVersions::from_fields(&HashMap::new()).is_none());
    }

    #[test]
    fn list_item_pinned_survives_field_round_trip() {
        let data = ChatListItemData {
            title: Some("enc:abc".to_string()),
            unread_count: 3,
            pinned: Some(true),
            ..Default::default()
        };
        let map: HashMap<String, String> = data.to_fields().into_iter().collect();
        let back = ChatListItemData::from_fields(&map).expect("fields present");
        assert_eq!(back.title.as_deref(), Some("enc:abc"));
        assert_eq!(back.unread_count, 3);
        assert_eq!(back.pinned, Some(true));
    }

    #[test]
    fn cached_message_serializes_role_lowercase() {
        let msg = CachedMessage {
            id: "m1".to_string(),
            chat_id: "c1".to_string(),
            role: MessageRole::Assistant,
            category: None,
            sender_name: None,
            encrypted_content: "enc".to_string(),
            model_name: None,
            status: MessageStatus::Synced,
            created_at: 1,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""role":"assistant""#));
        assert!(json.contains(r#""status":"synced""#));
    }
}
