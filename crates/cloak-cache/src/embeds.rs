//! Server-cached auxiliary embeds, reference-counted per chat through the
//! embed-id index set so cascade eviction can find them.

use redis::AsyncCommands;
use serde_json::Value;
use tracing::info;

use crate::error::Result;
use crate::keys::CacheKey;
use crate::ChatCache;

impl ChatCache {
    pub async fn chat_embed_ids(&self, chat_id: &str) -> Result<Vec<String>> {
        let mut conn = self.command_conn();
        let key = CacheKey::EmbedIds { chat_id }.to_string();
        Ok(conn.smembers(&key).await?)
    }

    /// Delete every embed referenced by a chat plus the index itself
    /// (chat deletion path; LRU eviction uses the cross-reference check
    /// instead). Returns how many embed entries were removed.
    pub async fn delete_chat_embeds(&self, chat_id: &str) -> Result<usize> {
        let mut conn = self.command_conn();
        let embed_ids = self.chat_embed_ids(chat_id).await?;
        let mut deleted = 0usize;
        for embed_id in &embed_ids {
            let key = CacheKey::Embed { embed_id }.to_string();
            let removed: i64 = conn.del(&key).await?;
            deleted += removed.max(0) as usize;
        }
        let index_key = CacheKey::EmbedIds { chat_id }.to_string();
        let _: () = conn.del(&index_key).await?;
        if deleted > 0 {
            info!(chat_id, deleted, "chat embeds deleted");
        }
        Ok(deleted)
    }

    /// Client-encrypted embed copies staged for phased sync, looked up via
    /// the chat's embed index. Expired entries are skipped silently.
    pub async fn sync_embeds_for_chat(&self, chat_id: &str) -> Result<Vec<Value>> {
        let mut conn = self.command_conn();
        let embed_ids = self.chat_embed_ids(chat_id).await?;
        let mut embeds = Vec::new();
        for embed_id in &embed_ids {
            let key = CacheKey::SyncEmbed { embed_id }.to_string();
            let raw: Option<String> = conn.get(&key).await?;
            if let Some(raw) = raw {
                if let Ok(value) = serde_json::from_str(&raw) {
                    embeds.push(value);
                }
            }
        }
        Ok(embeds)
    }
}
