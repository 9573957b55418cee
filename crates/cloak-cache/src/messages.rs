//! AI-inference and sync message lists, LRU tracking with cascade
//! eviction, and the atomic save-message contract.

use redis::AsyncCommands;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use cloak_protocol::model::CachedMessage;

use crate::error::Result;
use crate::keys::{sync_messages_pattern, CacheKey};
use crate::ChatCache;

/// New version state returned by [`ChatCache::save_message_and_update_versions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedVersions {
    pub messages_v: i64,
    pub last_edited_overall_timestamp: i64,
}

/// Of the embeds referenced by an evicted chat, those referenced by no
/// surviving chat. Pure so the cascade rule is testable without a KV.
pub fn embeds_to_evict(
    evicted_chat_embeds: &[String],
    surviving_chat_embeds: &[Vec<String>],
) -> Vec<String> {
    let still_referenced: HashSet<&str> = surviving_chat_embeds
        .iter()
        .flatten()
        .map(String::as_str)
        .collect();
    evicted_chat_embeds
        .iter()
        .filter(|id| !still_referenced.contains(id.as_str()))
        .cloned()
        .collect()
}

impl ChatCache {
    // --- AI cache (vault-encrypted, newest first) ---

    /// Prepend a vault-encrypted message to the AI list, trim to the
    /// configured bound, and register the activity in the LRU set.
    pub async fn push_ai_message(
        &self,
        user_id: &str,
        chat_id: &str,
        encrypted_message_json: &str,
    ) -> Result<()> {
        let mut conn = self.command_conn();
        let key = CacheKey::AiMessages { user_id, chat_id }.to_string();
        let max_len = self.policy().max_ai_history_length;
        let _: () = conn.lpush(&key, encrypted_message_json).await?;
        if max_len > 0 {
            let _: () = conn.ltrim(&key, 0, max_len as isize - 1).await?;
        }
        let _: () = conn
            .expire(&key, self.policy().chat_messages_ttl.secs())
            .await?;
        self.track_ai_activity(user_id, chat_id).await?;
        Ok(())
    }

    pub async fn ai_messages(&self, user_id: &str, chat_id: &str) -> Result<Vec<String>> {
        let mut conn = self.command_conn();
        let key = CacheKey::AiMessages { user_id, chat_id }.to_string();
        Ok(conn.lrange(&key, 0, -1).await?)
    }

    pub async fn delete_ai_messages(&self, user_id: &str, chat_id: &str) -> Result<()> {
        let mut conn = self.command_conn();
        let key = CacheKey::AiMessages { user_id, chat_id }.to_string();
        let lru_key = CacheKey::AiCacheLru { user_id }.to_string();
        let _: () = conn.del(&key).await?;
        let _: () = conn.zrem(&lru_key, chat_id).await?;
        Ok(())
    }

    /// Upsert the chat in the LRU set with the current time, then enforce
    /// the hot-set bound: chats past `top_n_messages_count` lose their AI
    /// list, their exclusively-held embeds, and their app-settings cache.
    pub async fn track_ai_activity(&self, user_id: &str, chat_id: &str) -> Result<()> {
        let mut conn = self.command_conn();
        let lru_key = CacheKey::AiCacheLru { user_id }.to_string();
        let now = chrono::Utc::now().timestamp() as f64;
        let _: () = conn.zadd(&lru_key, chat_id, now).await?;
        let _: () = conn
            .expire(&lru_key, self.policy().chat_messages_ttl.secs())
            .await?;

        let top_n = self.policy().top_n_messages_count;
        let total: i64 = conn.zcard(&lru_key).await?;
        if (total as usize) <= top_n {
            return Ok(());
        }

        // Oldest entries beyond the bound, and the survivors for the
        // embed cross-reference check.
        let excess = total as usize - top_n;
        let to_evict: Vec<String> = conn.zrange(&lru_key, 0, excess as isize - 1).await?;
        let survivors: Vec<String> = conn.zrange(&lru_key, excess as isize, -1).await?;

        let mut surviving_embed_sets = Vec::with_capacity(survivors.len());
        for survivor in &survivors {
            surviving_embed_sets.push(self.chat_embed_ids(survivor).await?);
        }

        for evict_chat_id in &to_evict {
            let ai_key = CacheKey::AiMessages {
                user_id,
                chat_id: evict_chat_id,
            }
            .to_string();
            let _: () = conn.del(&ai_key).await?;

            let embeds = self.chat_embed_ids(evict_chat_id).await?;
            let orphaned = embeds_to_evict(&embeds, &surviving_embed_sets);
            for embed_id in &orphaned {
                let embed_key = CacheKey::Embed { embed_id }.to_string();
                let _: () = conn.del(&embed_key).await?;
            }
            let index_key = CacheKey::EmbedIds {
                chat_id: evict_chat_id,
            }
            .to_string();
            let _: () = conn.del(&index_key).await?;

            let settings_removed = self
                .delete_chat_app_settings(user_id, evict_chat_id)
                .await?;

            let _: () = conn.zrem(&lru_key, evict_chat_id).await?;
            info!(
                user_id,
                chat_id = %evict_chat_id,
                embeds = orphaned.len(),
                settings = settings_removed,
                "evicted AI cache beyond hot-set bound"
            );
        }
        Ok(())
    }

    /// Serialize the message, prepend it to the AI list, bump or set
    /// `messages_v`, and move the chat's sorted-set score to the message's
    /// `created_at`. Any failing step fails the whole operation.
    pub async fn save_message_and_update_versions(
        &self,
        user_id: &str,
        chat_id: &str,
        message: &CachedMessage,
        explicit_messages_v: Option<i64>,
    ) -> Result<SavedVersions> {
        let message_json = serde_json::to_string(message)?;
        self.push_ai_message(user_id, chat_id, &message_json).await?;

        let messages_v = match explicit_messages_v {
            Some(v) => {
                self.set_component(user_id, chat_id, "messages_v", v).await?;
                v
            }
            None => {
                self.increment_component(user_id, chat_id, "messages_v")
                    .await?
            }
        };

        let last_edited_overall_timestamp = if message.created_at > 0 {
            message.created_at
        } else {
            warn!(
                chat_id,
                message_id = %message.id,
                "message carried no created_at, falling back to now"
            );
            chrono::Utc::now().timestamp()
        };
        self.add_chat_to_ids(user_id, chat_id, last_edited_overall_timestamp)
            .await?;

        debug!(
            chat_id,
            messages_v, last_edited_overall_timestamp, "message saved, versions updated"
        );
        Ok(SavedVersions {
            messages_v,
            last_edited_overall_timestamp,
        })
    }

    // --- sync cache (client-encrypted, chronological) ---

    /// Replace the sync list wholesale (cache warming).
    pub async fn set_sync_messages(
        &self,
        user_id: &str,
        chat_id: &str,
        encrypted_messages_json: &[String],
    ) -> Result<()> {
        let mut conn = self.command_conn();
        let key = CacheKey::SyncMessages { user_id, chat_id }.to_string();
        let _: () = conn.del(&key).await?;
        if !encrypted_messages_json.is_empty() {
            let _: () = conn.rpush(&key, encrypted_messages_json).await?;
        }
        let _: () = conn
            .expire(&key, self.policy().sync_messages_ttl.secs())
            .await?;
        Ok(())
    }

    /// Append one client-encrypted message, skipping it when a message
    /// with the same id is already present — replays would otherwise
    /// double messages on cold devices.
    pub async fn append_sync_message(
        &self,
        user_id: &str,
        chat_id: &str,
        encrypted_message_json: &str,
    ) -> Result<()> {
        let mut conn = self.command_conn();
        let key = CacheKey::SyncMessages { user_id, chat_id }.to_string();

        let incoming_id = message_id_of(encrypted_message_json);
        if let Some(incoming_id) = &incoming_id {
            let existing: Vec<String> = conn.lrange(&key, 0, -1).await?;
            if existing
                .iter()
                .filter_map(|raw| message_id_of(raw))
                .any(|id| &id == incoming_id)
            {
                debug!(chat_id, message_id = %incoming_id, "duplicate sync append skipped");
                return Ok(());
            }
        }

        let _: () = conn.rpush(&key, encrypted_message_json).await?;
        let _: () = conn
            .expire(&key, self.policy().sync_messages_ttl.secs())
            .await?;
        Ok(())
    }

    pub async fn sync_messages(&self, user_id: &str, chat_id: &str) -> Result<Vec<String>> {
        let mut conn = self.command_conn();
        let key = CacheKey::SyncMessages { user_id, chat_id }.to_string();
        Ok(conn.lrange(&key, 0, -1).await?)
    }

    /// Wholesale clear of a user's sync caches after Phase 3 succeeds.
    /// SCAN-based so one user's cleanup never blocks the server.
    pub async fn clear_all_sync_messages(&self, user_id: &str) -> Result<usize> {
        let mut conn = self.command_conn();
        let pattern = sync_messages_pattern(user_id);
        let mut cursor: u64 = 0;
        let mut deleted = 0usize;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;
            if !keys.is_empty() {
                let removed: i64 = conn.del(keys).await?;
                deleted += removed.max(0) as usize;
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        info!(user_id, deleted, "cleared sync message caches");
        Ok(deleted)
    }
}

/// Best-effort message id extraction from a serialized cache entry.
fn message_id_of(raw: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    value
        .get("id")
        .or_else(|| value.get("message_id"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eviction_spares_embeds_still_referenced_elsewhere() {
        let evicted = vec!["e1".to_string(), "e2".to_string(), "e3".to_string()];
        let survivors = vec![
            vec!["e2".to_string()],
            vec!["e4".to_string(), "e3".to_string()],
        ];
        assert_eq!(embeds_to_evict(&evicted, &survivors), vec!["e1".to_string()]);
    }

    #[test]
    fn eviction_with_no_survivors_removes_all() {
        let evicted = vec!["e1".to_string(), "e2".to_string()];
        assert_eq!(embeds_to_evict(&evicted, &[]), evicted);
    }

    #[test]
    fn message_id_prefers_id_over_message_id() {
        assert_eq!(
            message_id_of(r#"{"id":"a","message_id":"b"}"#),
            Some("a".to_string())
        );
        assert_eq!(
            message_id_of(r#"{"message_id":"b"}"#),
            Some("b".to_string())
        );
        assert_eq!(message_id_of("not json"), None);
    }
}
