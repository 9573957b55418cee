use cloak_core::config::CacheTuning;

/// A time-to-live carried as a typed value so call sites cannot pass a
/// bare integer from the wrong policy slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ttl(pub u64);

impl Ttl {
    pub fn secs(self) -> i64 {
        self.0 as i64
    }

    pub fn secs_u64(self) -> u64 {
        self.0
    }
}

/// TTL and sizing policy for every key family the cache owns. Values come
/// from configuration; the cache applies them without judgement.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub chat_ids_versions_ttl: Ttl,
    pub chat_versions_ttl: Ttl,
    pub chat_list_item_data_ttl: Ttl,
    pub chat_messages_ttl: Ttl,
    pub user_draft_ttl: Ttl,
    pub sync_messages_ttl: Ttl,
    pub active_task_ttl: Ttl,
    pub embed_ttl: Ttl,
    pub pending_request_ttl: Ttl,
    pub top_n_messages_count: usize,
    pub max_ai_history_length: usize,
}

impl From<&CacheTuning> for CachePolicy {
    fn from(tuning: &CacheTuning) -> Self {
        Self {
            chat_ids_versions_ttl: Ttl(tuning.chat_ids_versions_ttl),
            chat_versions_ttl: Ttl(tuning.chat_versions_ttl),
            chat_list_item_data_ttl: Ttl(tuning.chat_list_item_data_ttl),
            chat_messages_ttl: Ttl(tuning.chat_messages_ttl),
            user_draft_ttl: Ttl(tuning.user_draft_ttl),
            sync_messages_ttl: Ttl(tuning.sync_messages_ttl),
            active_task_ttl: Ttl(tuning.active_task_ttl),
            embed_ttl: Ttl(tuning.embed_ttl),
            pending_request_ttl: Ttl(tuning.pending_request_ttl),
            top_n_messages_count: tuning.top_n_messages_count,
            max_ai_history_length: tuning.max_ai_history_length,
        }
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self::from(&CacheTuning::default())
    }
}
