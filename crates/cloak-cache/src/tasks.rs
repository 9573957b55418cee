//! Single-flight AI task bookkeeping: active-task mapping pair, per-chat
//! request queue, and the pending permission-request blob.

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use cloak_protocol::model::{AskSkillRequest, PendingPermissionRequest};

use crate::error::Result;
use crate::keys::CacheKey;
use crate::ChatCache;

impl ChatCache {
    /// Mark a chat's task as active and store the reverse mapping used for
    /// cancellation ownership. Both keys share the active-task TTL so a
    /// crashed worker cannot wedge a chat forever.
    pub async fn set_active_task(&self, chat_id: &str, task_id: &str) -> Result<()> {
        let mut conn = self.command_conn();
        let key = CacheKey::ActiveAiTask { chat_id }.to_string();
        let reverse_key = CacheKey::TaskChat { task_id }.to_string();
        let ttl = self.policy().active_task_ttl.secs_u64();
        let _: () = conn.set_ex(&key, task_id, ttl).await?;
        let _: () = conn.set_ex(&reverse_key, chat_id, ttl).await?;
        debug!(chat_id, task_id, "active AI task set");
        Ok(())
    }

    pub async fn active_task(&self, chat_id: &str) -> Result<Option<String>> {
        let mut conn = self.command_conn();
        let key = CacheKey::ActiveAiTask { chat_id }.to_string();
        Ok(conn.get(&key).await?)
    }

    pub async fn chat_for_task(&self, task_id: &str) -> Result<Option<String>> {
        let mut conn = self.command_conn();
        let key = CacheKey::TaskChat { task_id }.to_string();
        Ok(conn.get(&key).await?)
    }

    /// Clear the active marker and its reverse mapping.
    pub async fn clear_active_task(&self, chat_id: &str) -> Result<()> {
        let mut conn = self.command_conn();
        let key = CacheKey::ActiveAiTask { chat_id }.to_string();
        let task_id: Option<String> = conn.get(&key).await?;
        if let Some(task_id) = task_id {
            let reverse_key = CacheKey::TaskChat {
                task_id: &task_id,
            }
            .to_string();
            let _: () = conn.del(&reverse_key).await?;
        }
        let _: () = conn.del(&key).await?;
        debug!(chat_id, "active AI task cleared");
        Ok(())
    }

    /// Queue a request behind the chat's active task.
    pub async fn queue_request(&self, chat_id: &str, request: &AskSkillRequest) -> Result<i64> {
        let mut conn = self.command_conn();
        let key = CacheKey::MessageQueue { chat_id }.to_string();
        let json = serde_json::to_string(request)?;
        let _: () = conn.rpush(&key, json).await?;
        let _: () = conn
            .expire(&key, self.policy().active_task_ttl.secs())
            .await?;
        let len: i64 = conn.llen(&key).await?;
        info!(chat_id, queue_len = len, "AI request queued behind active task");
        Ok(len)
    }

    /// Read and clear the queue. Entries that fail to parse are dropped
    /// with a warning rather than poisoning the drain.
    pub async fn drain_queue(&self, chat_id: &str) -> Result<Vec<AskSkillRequest>> {
        let mut conn = self.command_conn();
        let key = CacheKey::MessageQueue { chat_id }.to_string();
        let raw: Vec<String> = conn.lrange(&key, 0, -1).await?;
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        let _: () = conn.del(&key).await?;
        let mut requests = Vec::with_capacity(raw.len());
        for entry in raw {
            match serde_json::from_str::<AskSkillRequest>(&entry) {
                Ok(req) => requests.push(req),
                Err(e) => warn!(chat_id, error = %e, "dropping unparsable queued request"),
            }
        }
        info!(chat_id, drained = requests.len(), "AI request queue drained");
        Ok(requests)
    }

    // --- pending permission request ---

    pub async fn store_pending_request(
        &self,
        chat_id: &str,
        context: &PendingPermissionRequest,
    ) -> Result<()> {
        let mut conn = self.command_conn();
        let key = CacheKey::PendingPermissionRequest { chat_id }.to_string();
        let json = serde_json::to_string(context)?;
        let _: () = conn
            .set_ex(&key, json, self.policy().pending_request_ttl.secs_u64())
            .await?;
        info!(chat_id, request_id = %context.request_id, "pending permission request stored");
        Ok(())
    }

    pub async fn pending_request(
        &self,
        chat_id: &str,
    ) -> Result<Option<PendingPermissionRequest>> {
        let mut conn = self.command_conn();
        let key = CacheKey::PendingPermissionRequest { chat_id }.to_string();
        let raw: Option<String> = conn.get(&key).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn delete_pending_request(&self, chat_id: &str) -> Result<()> {
        let mut conn = self.command_conn();
        let key = CacheKey::PendingPermissionRequest { chat_id }.to_string();
        let _: () = conn.del(&key).await?;
        Ok(())
    }
}
