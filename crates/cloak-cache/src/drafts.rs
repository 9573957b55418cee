//! Per-user, per-chat draft storage and its two-place version tracking.

use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::debug;

use cloak_protocol::model::{user_draft_field, CachedDraft};

use crate::error::Result;
use crate::keys::CacheKey;
use crate::ChatCache;

impl ChatCache {
    /// Increment a user's draft version for a chat.
    ///
    /// The version lives in two places: `draft_v` in the dedicated draft
    /// hash and `user_draft_v:{uid}` in the chat's versions hash. The
    /// dedicated key can expire independently, so when its field is
    /// missing the counter is re-seeded from the versions hash before the
    /// increment — otherwise a fresh draft would restart at 1 and clients
    /// would ignore the update as stale.
    pub async fn increment_draft_version(&self, user_id: &str, chat_id: &str) -> Result<i64> {
        let mut conn = self.command_conn();
        let draft_key = CacheKey::UserDraft { user_id, chat_id }.to_string();
        let versions_key = CacheKey::ChatVersions { user_id, chat_id }.to_string();
        let draft_field = user_draft_field(user_id);

        let dedicated_exists: bool = conn.hexists(&draft_key, "draft_v").await?;
        if !dedicated_exists {
            let base: Option<String> = conn.hget(&versions_key, &draft_field).await?;
            if let Some(base) = base.and_then(|v| v.parse::<i64>().ok()) {
                debug!(chat_id, base, "re-seeding draft_v from versions hash");
                let _: () = conn.hset(&draft_key, "draft_v", base).await?;
            }
        }

        let new_version: i64 = conn.hincr(&draft_key, "draft_v", 1).await?;
        let _: () = conn
            .expire(&draft_key, self.policy().user_draft_ttl.secs())
            .await?;

        let _: () = conn.hset(&versions_key, &draft_field, new_version).await?;
        let _: () = conn.hset_nx(&versions_key, "messages_v", 0).await?;
        let _: () = conn.hset_nx(&versions_key, "title_v", 0).await?;
        let _: () = conn
            .expire(&versions_key, self.policy().chat_versions_ttl.secs())
            .await?;

        Ok(new_version)
    }

    /// Write draft content and version. Cleared content is stored as the
    /// literal string "null" so the hash field stays present.
    pub async fn put_draft(
        &self,
        user_id: &str,
        chat_id: &str,
        encrypted_draft_md: Option<&str>,
        draft_version: i64,
    ) -> Result<()> {
        let mut conn = self.command_conn();
        let key = CacheKey::UserDraft { user_id, chat_id }.to_string();
        let fields = [
            ("draft_v".to_string(), draft_version.to_string()),
            (
                "encrypted_draft_md".to_string(),
                encrypted_draft_md.unwrap_or("null").to_string(),
            ),
        ];
        let _: () = conn.hset_multiple(&key, &fields).await?;
        let _: () = conn
            .expire(&key, self.policy().user_draft_ttl.secs())
            .await?;
        Ok(())
    }

    pub async fn draft(
        &self,
        user_id: &str,
        chat_id: &str,
        refresh_ttl: bool,
    ) -> Result<Option<CachedDraft>> {
        let mut conn = self.command_conn();
        let key = CacheKey::UserDraft { user_id, chat_id }.to_string();
        let fields: HashMap<String, String> = conn.hgetall(&key).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let Some(draft_v) = fields.get("draft_v").and_then(|v| v.parse::<i64>().ok()) else {
            return Ok(None);
        };
        let encrypted_draft_md = match fields.get("encrypted_draft_md").map(String::as_str) {
            None | Some("null") => None,
            Some(md) => Some(md.to_string()),
        };
        if refresh_ttl {
            let _: () = conn
                .expire(&key, self.policy().user_draft_ttl.secs())
                .await?;
        }
        Ok(Some(CachedDraft {
            encrypted_draft_md,
            draft_v,
        }))
    }

    /// Delete the dedicated draft key. Returns whether a key was removed.
    pub async fn delete_draft(&self, user_id: &str, chat_id: &str) -> Result<bool> {
        let mut conn = self.command_conn();
        let key = CacheKey::UserDraft { user_id, chat_id }.to_string();
        let deleted: i64 = conn.del(&key).await?;
        Ok(deleted > 0)
    }

    /// Remove the user's `user_draft_v:{uid}` field from the chat's
    /// versions hash, so a future draft starts from version 1.
    pub async fn delete_draft_version_field(&self, user_id: &str, chat_id: &str) -> Result<()> {
        let mut conn = self.command_conn();
        let key = CacheKey::ChatVersions { user_id, chat_id }.to_string();
        let _: () = conn.hdel(&key, user_draft_field(user_id)).await?;
        Ok(())
    }
}
