use std::fmt;

/// Every key the Cache Layer owns, as an algebraic type with one
/// formatter. Nothing outside this module builds key strings by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKey<'a> {
    /// Sorted set: score = `last_edited_overall_timestamp`, member = chat id.
    ChatIdsVersions { user_id: &'a str },
    /// Hash: `messages_v`, `title_v`, dynamic `user_draft_v:{uid}` fields.
    ChatVersions { user_id: &'a str, chat_id: &'a str },
    /// Hash of encrypted per-chat list fields.
    ChatListItemData { user_id: &'a str, chat_id: &'a str },
    /// Hash: `{encrypted_draft_md, draft_v}`.
    UserDraft { user_id: &'a str, chat_id: &'a str },
    /// List, newest first, vault-encrypted.
    AiMessages { user_id: &'a str, chat_id: &'a str },
    /// List, chronological, client-encrypted; cleared after Phase 3.
    SyncMessages { user_id: &'a str, chat_id: &'a str },
    /// Sorted set: score = last activity, member = chat id.
    AiCacheLru { user_id: &'a str },
    /// String: the active task id for a chat.
    ActiveAiTask { chat_id: &'a str },
    /// String: reverse mapping task id → chat id.
    TaskChat { task_id: &'a str },
    /// List of serialized AI requests queued behind an active task.
    MessageQueue { chat_id: &'a str },
    /// Set of embed ids referenced by a chat.
    EmbedIds { chat_id: &'a str },
    /// String: one vault-encrypted embed blob.
    Embed { embed_id: &'a str },
    /// String: client-encrypted embed copy staged for phased sync.
    SyncEmbed { embed_id: &'a str },
    /// String: one vault-encrypted app-settings/memories entry.
    AppSettingsMemories {
        chat_id: &'a str,
        app_id: &'a str,
        item_key: &'a str,
    },
    /// Set of `app_id:item_key` entries cached for a chat.
    AppSettingsMemoriesIndex { chat_id: &'a str },
    /// String: the pending permission-request context blob.
    PendingPermissionRequest { chat_id: &'a str },
    /// String: JSON array of suggestion objects, keyed by hashed user id.
    NewChatSuggestions { user_id_hash: &'a str },
    /// String flag set once Phase 3 warming completed.
    CachePrimed { user_id: &'a str },
}

impl fmt::Display for CacheKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::ChatIdsVersions { user_id } => {
                write!(f, "user:{}:chat_ids_versions", user_id)
            }
            CacheKey::ChatVersions { user_id, chat_id } => {
                write!(f, "user:{}:chat:{}:versions", user_id, chat_id)
            }
            CacheKey::ChatListItemData { user_id, chat_id } => {
                write!(f, "user:{}:chat:{}:list_item_data", user_id, chat_id)
            }
            CacheKey::UserDraft { user_id, chat_id } => {
                write!(f, "user:{}:chat:{}:draft", user_id, chat_id)
            }
            CacheKey::AiMessages { user_id, chat_id } => {
                write!(f, "user:{}:chat:{}:messages:ai", user_id, chat_id)
            }
            CacheKey::SyncMessages { user_id, chat_id } => {
                write!(f, "user:{}:chat:{}:messages:sync", user_id, chat_id)
            }
            CacheKey::AiCacheLru { user_id } => write!(f, "user:{}:ai_cache_lru", user_id),
            CacheKey::ActiveAiTask { chat_id } => write!(f, "chat:{}:active_ai_task", chat_id),
            CacheKey::TaskChat { task_id } => write!(f, "active_task:{}:chat_id", task_id),
            CacheKey::MessageQueue { chat_id } => write!(f, "chat:{}:message_queue", chat_id),
            CacheKey::EmbedIds { chat_id } => write!(f, "chat:{}:embed_ids", chat_id),
            CacheKey::Embed { embed_id } => write!(f, "embed:{}", embed_id),
            CacheKey::SyncEmbed { embed_id } => write!(f, "embed:{}:sync", embed_id),
            CacheKey::AppSettingsMemories {
                chat_id,
                app_id,
                item_key,
            } => write!(
                f,
                "chat:{}:app_settings_memories:{}:{}",
                chat_id, app_id, item_key
            ),
            CacheKey::AppSettingsMemoriesIndex { chat_id } => {
                write!(f, "chat:{}:app_settings_memories_keys", chat_id)
            }
            CacheKey::PendingPermissionRequest { chat_id } => {
                write!(f, "pending_app_settings_memories_request:{}", chat_id)
            }
            CacheKey::NewChatSuggestions { user_id_hash } => {
                write!(f, "user:{}:new_chat_suggestions", user_id_hash)
            }
            CacheKey::CachePrimed { user_id } => write!(f, "user:{}:cache_primed", user_id),
        }
    }
}

/// SCAN pattern matching every sync message list of one user.
pub fn sync_messages_pattern(user_id: &str) -> String {
    format!("user:{}:chat:*:messages:sync", user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_is_stable() {
        assert_eq!(
            CacheKey::ChatIdsVersions { user_id: "u1" }.to_string(),
            "user:u1:chat_ids_versions"
        );
        assert_eq!(
            CacheKey::ChatVersions {
                user_id: "u1",
                chat_id: "c2"
            }
            .to_string(),
            "user:u1:chat:c2:versions"
        );
        assert_eq!(
            CacheKey::AiMessages {
                user_id: "u1",
                chat_id: "c2"
            }
            .to_string(),
            "user:u1:chat:c2:messages:ai"
        );
        assert_eq!(
            CacheKey::SyncMessages {
                user_id: "u1",
                chat_id: "c2"
            }
            .to_string(),
            "user:u1:chat:c2:messages:sync"
        );
        assert_eq!(
            CacheKey::ActiveAiTask { chat_id: "c3" }.to_string(),
            "chat:c3:active_ai_task"
        );
        assert_eq!(
            CacheKey::TaskChat { task_id: "t9" }.to_string(),
            "active_task:t9:chat_id"
        );
        assert_eq!(
            CacheKey::AppSettingsMemories {
                chat_id: "c1",
                app_id: "code",
                item_key: "preferred_tech"
            }
            .to_string(),
            "chat:c1:app_settings_memories:code:preferred_tech"
        );
        assert_eq!(
            CacheKey::PendingPermissionRequest { chat_id: "c1" }.to_string(),
            "pending_app_settings_memories_request:c1"
        );
    }

    #[test]
    fn sync_pattern_scopes_to_one_user() {
        assert_eq!(
            sync_messages_pattern("u7"),
            "user:u7:chat:*:messages:sync"
        );
    }
}
