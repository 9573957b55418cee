//! Chat list sorted set, per-chat versions hash, and list-item data.

use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::debug;

use cloak_protocol::model::{ChatListItemData, ChatVersions};

use crate::error::Result;
use crate::keys::CacheKey;
use crate::ChatCache;

impl ChatCache {
    /// Add a chat to the user's master sorted set, scored by its
    /// `last_edited_overall_timestamp`. Also the score-update path — ZADD
    /// upserts, which keeps the bump atomic with the member.
    pub async fn add_chat_to_ids(
        &self,
        user_id: &str,
        chat_id: &str,
        last_edited_overall_timestamp: i64,
    ) -> Result<()> {
        let mut conn = self.command_conn();
        let key = CacheKey::ChatIdsVersions { user_id }.to_string();
        let _: () = conn
            .zadd(&key, chat_id, last_edited_overall_timestamp as f64)
            .await?;
        let _: () = conn
            .expire(&key, self.policy().chat_ids_versions_ttl.secs())
            .await?;
        Ok(())
    }

    pub async fn remove_chat_from_ids(&self, user_id: &str, chat_id: &str) -> Result<bool> {
        let mut conn = self.command_conn();
        let key = CacheKey::ChatIdsVersions { user_id }.to_string();
        let removed: i64 = conn.zrem(&key, chat_id).await?;
        Ok(removed > 0)
    }

    /// A recency-ordered slice of chat ids, `start..=end` by rank.
    pub async fn chat_ids_range(
        &self,
        user_id: &str,
        start: isize,
        end: isize,
    ) -> Result<Vec<String>> {
        let mut conn = self.command_conn();
        let key = CacheKey::ChatIdsVersions { user_id }.to_string();
        Ok(conn.zrevrange(&key, start, end).await?)
    }

    /// Chat ids with their `last_edited_overall_timestamp` scores, most
    /// recent first.
    pub async fn chat_ids_with_scores(&self, user_id: &str) -> Result<Vec<(String, i64)>> {
        let mut conn = self.command_conn();
        let key = CacheKey::ChatIdsVersions { user_id }.to_string();
        let entries: Vec<(String, f64)> = conn.zrevrange_withscores(&key, 0, -1).await?;
        Ok(entries
            .into_iter()
            .map(|(id, score)| (id, score as i64))
            .collect())
    }

    pub async fn chat_count(&self, user_id: &str) -> Result<usize> {
        let mut conn = self.command_conn();
        let key = CacheKey::ChatIdsVersions { user_id }.to_string();
        let count: i64 = conn.zcard(&key).await?;
        Ok(count.max(0) as usize)
    }

    // --- versions hash ---

    pub async fn set_chat_versions(
        &self,
        user_id: &str,
        chat_id: &str,
        versions: &ChatVersions,
    ) -> Result<()> {
        let mut conn = self.command_conn();
        let key = CacheKey::ChatVersions { user_id, chat_id }.to_string();
        let mut fields: Vec<(String, String)> = vec![
            ("messages_v".to_string(), versions.messages_v.to_string()),
            ("title_v".to_string(), versions.title_v.to_string()),
        ];
        for (name, value) in &versions.extra {
            fields.push((name.clone(), value.to_string()));
        }
        let _: () = conn.hset_multiple(&key, &fields).await?;
        let _: () = conn
            .expire(&key, self.policy().chat_versions_ttl.secs())
            .await?;
        Ok(())
    }

    pub async fn chat_versions(
        &self,
        user_id: &str,
        chat_id: &str,
    ) -> Result<Option<ChatVersions>> {
        let mut conn = self.command_conn();
        let key = CacheKey::ChatVersions { user_id, chat_id }.to_string();
        let fields: HashMap<String, String> = conn.hgetall(&key).await?;
        Ok(ChatVersions::from_fields(&fields))
    }

    /// Increment-and-fetch for one version component. HINCRBY is atomic
    /// per key, and the base fields are back-filled with HSETNX so a hash
    /// created by the increment still parses as a full `ChatVersions`.
    pub async fn increment_component(
        &self,
        user_id: &str,
        chat_id: &str,
        component: &str,
    ) -> Result<i64> {
        let mut conn = self.command_conn();
        let key = CacheKey::ChatVersions { user_id, chat_id }.to_string();
        let new_version: i64 = conn.hincr(&key, component, 1).await?;
        let _: () = conn.hset_nx(&key, "messages_v", 0).await?;
        let _: () = conn.hset_nx(&key, "title_v", 0).await?;
        let _: () = conn
            .expire(&key, self.policy().chat_versions_ttl.secs())
            .await?;
        debug!(chat_id, component, new_version, "version incremented");
        Ok(new_version)
    }

    /// Set one version component to an absolute value (Records-sourced).
    pub async fn set_component(
        &self,
        user_id: &str,
        chat_id: &str,
        component: &str,
        value: i64,
    ) -> Result<()> {
        let mut conn = self.command_conn();
        let key = CacheKey::ChatVersions { user_id, chat_id }.to_string();
        let _: () = conn.hset(&key, component, value).await?;
        let _: () = conn.hset_nx(&key, "messages_v", 0).await?;
        let _: () = conn.hset_nx(&key, "title_v", 0).await?;
        let _: () = conn
            .expire(&key, self.policy().chat_versions_ttl.secs())
            .await?;
        Ok(())
    }

    // --- list-item data hash ---

    pub async fn set_list_item(
        &self,
        user_id: &str,
        chat_id: &str,
        data: &ChatListItemData,
    ) -> Result<()> {
        let mut conn = self.command_conn();
        let key = CacheKey::ChatListItemData { user_id, chat_id }.to_string();
        let fields = data.to_fields();
        if !fields.is_empty() {
            let _: () = conn.hset_multiple(&key, &fields).await?;
        }
        let _: () = conn
            .expire(&key, self.policy().chat_list_item_data_ttl.secs())
            .await?;
        Ok(())
    }

    pub async fn list_item(
        &self,
        user_id: &str,
        chat_id: &str,
        refresh_ttl: bool,
    ) -> Result<Option<ChatListItemData>> {
        let mut conn = self.command_conn();
        let key = CacheKey::ChatListItemData { user_id, chat_id }.to_string();
        let fields: HashMap<String, String> = conn.hgetall(&key).await?;
        let data = ChatListItemData::from_fields(&fields);
        if data.is_some() && refresh_ttl {
            let _: () = conn
                .expire(&key, self.policy().chat_list_item_data_ttl.secs())
                .await?;
        }
        Ok(data)
    }

    pub async fn set_list_item_field(
        &self,
        user_id: &str,
        chat_id: &str,
        field: &str,
        value: &str,
    ) -> Result<()> {
        let mut conn = self.command_conn();
        let key = CacheKey::ChatListItemData { user_id, chat_id }.to_string();
        let _: () = conn.hset(&key, field, value).await?;
        let _: () = conn
            .expire(&key, self.policy().chat_list_item_data_ttl.secs())
            .await?;
        Ok(())
    }

    /// Scroll anchor: the last message visible on the device.
    pub async fn set_scroll_position(
        &self,
        user_id: &str,
        chat_id: &str,
        message_id: &str,
    ) -> Result<()> {
        self.set_list_item_field(user_id, chat_id, "last_visible_message_id", message_id)
            .await
    }

    pub async fn set_unread_count(
        &self,
        user_id: &str,
        chat_id: &str,
        unread_count: i64,
    ) -> Result<()> {
        self.set_list_item_field(user_id, chat_id, "unread_count", &unread_count.to_string())
            .await
    }

    /// Delete the per-chat general cache keys in one pipeline (versions,
    /// list item, AI message list). The sorted-set removal, embed cascade
    /// and app-settings cleanup are separate steps of the tombstone.
    pub async fn delete_chat_general_keys(&self, user_id: &str, chat_id: &str) -> Result<()> {
        let mut conn = self.command_conn();
        let mut pipe = redis::pipe();
        pipe.del(CacheKey::ChatVersions { user_id, chat_id }.to_string())
            .ignore()
            .del(CacheKey::ChatListItemData { user_id, chat_id }.to_string())
            .ignore()
            .del(CacheKey::AiMessages { user_id, chat_id }.to_string())
            .ignore()
            .del(CacheKey::SyncMessages { user_id, chat_id }.to_string())
            .ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}
