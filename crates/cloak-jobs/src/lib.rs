//! Worker Runner interface. The runner itself lives outside this
//! workspace; the core only pushes named-job envelopes onto per-queue
//! lists and publishes revocations on a control channel.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

// Queues the core dispatches onto.
pub const QUEUE_PERSISTENCE: &str = "persistence";
pub const QUEUE_APP_AI: &str = "app_ai";

// Job names the core enqueues.
pub const TASK_PERSIST_NEW_CHAT_MESSAGE: &str = "persist_new_chat_message";
pub const TASK_PERSIST_ENCRYPTED_CHAT_METADATA: &str = "persist_encrypted_chat_metadata";
pub const TASK_PERSIST_CHAT_TITLE: &str = "persist_chat_title";
pub const TASK_PERSIST_DELETE_CHAT: &str = "persist_delete_chat";
pub const TASK_PERSIST_AI_RESPONSE: &str = "persist_ai_response";
pub const TASK_PERSIST_NEW_CHAT_SUGGESTIONS: &str = "persist_new_chat_suggestions";
pub const TASK_ASK_SKILL: &str = "ask";

const CONTROL_CHANNEL: &str = "jobs:control";

#[derive(Debug, Error)]
pub enum JobsError {
    #[error("kv error: {0}")]
    Kv(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, JobsError>;

/// One job on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub id: String,
    pub task: String,
    pub queue: String,
    pub kwargs: Value,
    pub enqueued_at: i64,
}

/// A revocation published on the control channel. Workers that observe
/// their own task id stop and emit a final, revocation-marked chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessage {
    pub action: String,
    pub task_id: String,
}

/// Dispatch handle for the Worker Runner.
#[derive(Clone)]
pub struct JobQueue {
    conn: ConnectionManager,
}

impl JobQueue {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn queue_key(queue: &str) -> String {
        format!("jobs:{}", queue)
    }

    /// Enqueue a named job with a fresh task id. Returns the id.
    pub async fn enqueue(&self, queue: &str, task: &str, kwargs: Value) -> Result<String> {
        let task_id = Uuid::new_v4().to_string();
        self.enqueue_with_id(queue, task, &task_id, kwargs).await?;
        Ok(task_id)
    }

    /// Enqueue under a caller-chosen task id (the AI dispatcher mints the
    /// id first so the single-flight mapping and the job agree).
    pub async fn enqueue_with_id(
        &self,
        queue: &str,
        task: &str,
        task_id: &str,
        kwargs: Value,
    ) -> Result<()> {
        let envelope = JobEnvelope {
            id: task_id.to_string(),
            task: task.to_string(),
            queue: queue.to_string(),
            kwargs,
            enqueued_at: chrono::Utc::now().timestamp(),
        };
        let json = serde_json::to_string(&envelope)?;
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(Self::queue_key(queue), json).await?;
        info!(task, task_id, queue, "job enqueued");
        Ok(())
    }

    /// Ask the runner to revoke a task. Best-effort: a task that already
    /// finished ignores the message.
    pub async fn revoke(&self, task_id: &str) -> Result<()> {
        let message = ControlMessage {
            action: "revoke".to_string(),
            task_id: task_id.to_string(),
        };
        let json = serde_json::to_string(&message)?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("PUBLISH")
            .arg(CONTROL_CHANNEL)
            .arg(json)
            .query_async(&mut conn)
            .await?;
        debug!(task_id, "revocation published");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_wire_shape() {
        let envelope = JobEnvelope {
            id: "t-1".to_string(),
            task: TASK_PERSIST_CHAT_TITLE.to_string(),
            queue: QUEUE_PERSISTENCE.to_string(),
            kwargs: serde_json::json!({"chat_id": "c1"}),
            enqueued_at: 100,
        };
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""task":"persist_chat_title""#));
        let back: JobEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kwargs["chat_id"], "c1");
    }
}
