//! Vault-encrypted app-settings/memories entries, chat-scoped so they are
//! swept together with the chat's AI cache.

use redis::AsyncCommands;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::keys::CacheKey;
use crate::ChatCache;

impl ChatCache {
    pub async fn app_settings(
        &self,
        chat_id: &str,
        app_id: &str,
        item_key: &str,
    ) -> Result<Option<Value>> {
        let mut conn = self.command_conn();
        let key = CacheKey::AppSettingsMemories {
            chat_id,
            app_id,
            item_key,
        }
        .to_string();
        let raw: Option<String> = conn.get(&key).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Cache one entry and register it in the chat's index set so chat
    /// eviction can sweep it.
    pub async fn put_app_settings(
        &self,
        chat_id: &str,
        app_id: &str,
        item_key: &str,
        data: &Value,
    ) -> Result<()> {
        let mut conn = self.command_conn();
        let key = CacheKey::AppSettingsMemories {
            chat_id,
            app_id,
            item_key,
        }
        .to_string();
        let ttl = self.policy().embed_ttl;
        let json = serde_json::to_string(data)?;
        let _: () = conn.set_ex(&key, json, ttl.secs_u64()).await?;

        let index_key = CacheKey::AppSettingsMemoriesIndex { chat_id }.to_string();
        let _: () = conn
            .sadd(&index_key, format!("{}:{}", app_id, item_key))
            .await?;
        let _: () = conn.expire(&index_key, ttl.secs()).await?;
        debug!(chat_id, app_id, item_key, "app settings/memories cached");
        Ok(())
    }

    pub async fn app_settings_keys(&self, chat_id: &str) -> Result<Vec<String>> {
        let mut conn = self.command_conn();
        let key = CacheKey::AppSettingsMemoriesIndex { chat_id }.to_string();
        Ok(conn.smembers(&key).await?)
    }

    /// Batch lookup. `requested_keys` entries are `app_id:item_key`; only
    /// found entries appear in the result.
    pub async fn app_settings_batch(
        &self,
        chat_id: &str,
        requested_keys: &[String],
    ) -> Result<HashMap<String, Value>> {
        let mut found = HashMap::new();
        for key_str in requested_keys {
            let Some((app_id, item_key)) = key_str.split_once(':') else {
                warn!(chat_id, key = %key_str, "invalid app settings/memories key format");
                continue;
            };
            if let Some(data) = self.app_settings(chat_id, app_id, item_key).await? {
                found.insert(key_str.clone(), data);
            }
        }
        debug!(
            chat_id,
            found = found.len(),
            requested = requested_keys.len(),
            "app settings/memories batch lookup"
        );
        Ok(found)
    }

    /// Delete every cached entry for a chat plus the index. Returns the
    /// number of entries removed.
    pub async fn delete_chat_app_settings(&self, user_id: &str, chat_id: &str) -> Result<usize> {
        let mut conn = self.command_conn();
        let keys = self.app_settings_keys(chat_id).await?;
        let mut deleted = 0usize;
        for key_str in &keys {
            let Some((app_id, item_key)) = key_str.split_once(':') else {
                continue;
            };
            let key = CacheKey::AppSettingsMemories {
                chat_id,
                app_id,
                item_key,
            }
            .to_string();
            let removed: i64 = conn.del(&key).await?;
            deleted += removed.max(0) as usize;
        }
        let index_key = CacheKey::AppSettingsMemoriesIndex { chat_id }.to_string();
        let _: () = conn.del(&index_key).await?;
        if deleted > 0 {
            info!(user_id, chat_id, deleted, "app settings/memories entries deleted");
        }
        Ok(deleted)
    }
}
