//! New-chat suggestion invalidation and the per-user primed flag.

use redis::AsyncCommands;

use crate::error::Result;
use crate::keys::CacheKey;
use crate::ChatCache;

impl ChatCache {
    /// Invalidate the cached suggestion list so the next sync refetches
    /// from Records. Workers own the write side.
    pub async fn delete_new_chat_suggestions(&self, user_id_hash: &str) -> Result<()> {
        let mut conn = self.command_conn();
        let key = CacheKey::NewChatSuggestions { user_id_hash }.to_string();
        let _: () = conn.del(&key).await?;
        Ok(())
    }

    /// Set after Phase 3 completes; carries the same TTL as the chat list.
    pub async fn set_cache_primed(&self, user_id: &str) -> Result<()> {
        let mut conn = self.command_conn();
        let key = CacheKey::CachePrimed { user_id }.to_string();
        let _: () = conn
            .set_ex(&key, "1", self.policy().chat_ids_versions_ttl.secs_u64())
            .await?;
        Ok(())
    }

    pub async fn is_cache_primed(&self, user_id: &str) -> Result<bool> {
        let mut conn = self.command_conn();
        let key = CacheKey::CachePrimed { user_id }.to_string();
        let value: Option<String> = conn.get(&key).await?;
        Ok(value.is_some())
    }
}
