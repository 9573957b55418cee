pub mod client;
pub mod error;
pub mod types;

pub use client::HttpRecords;
pub use error::{RecordsError, Result};
pub use types::{ChatRecord, UserProfile, WarmChatEntry};

use async_trait::async_trait;
use serde_json::Value;

/// The durable document store behind the cache. The core only ever talks
/// to it through this trait; the cache remains the authority for anything
/// it holds, with Records as the eventual-consistency floor.
#[async_trait]
pub trait Records: Send + Sync {
    /// Chat metadata, or `None` when the chat has never been persisted.
    async fn chat_metadata(&self, chat_id: &str) -> Result<Option<ChatRecord>>;

    /// Whether the hashed user owns the chat. A chat that does not exist
    /// is NOT owned — callers decide whether absence means "new/local".
    async fn check_chat_ownership(&self, chat_id: &str, user_id_hash: &str) -> Result<bool>;

    /// All persisted messages for a chat as JSON-serialized,
    /// client-encrypted strings, chronological order.
    async fn messages_for_chat(&self, chat_id: &str) -> Result<Vec<String>>;

    async fn user_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;

    /// Patch user fields (e.g. `last_opened`).
    async fn update_user(&self, user_id: &str, patch: &Value) -> Result<()>;

    /// Id of the user's draft row for a chat, if one was persisted.
    async fn find_draft(&self, user_id_hash: &str, chat_id: &str) -> Result<Option<String>>;

    async fn delete_draft(&self, draft_id: &str) -> Result<()>;

    /// The most recently updated chats with the user's drafts attached,
    /// for phased cache warming.
    async fn chats_for_warming(
        &self,
        user_id_hash: &str,
        limit: usize,
    ) -> Result<Vec<WarmChatEntry>>;

    async fn update_chat_read_status(&self, chat_id: &str, unread_count: i64) -> Result<()>;
}
