use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Gateway constants
pub const DEFAULT_PORT: u16 = 18620;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024; // hard cap per inbound frame
pub const DISCONNECT_GRACE_SECS: u64 = 5; // reconnect window before registry cleanup
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 64; // per-connection send queue

/// Sentinel substring workers embed in stream content on provider failure.
pub const ERROR_SENTINEL: &str = "[ERROR";
/// Fixed i18n key clients render instead of raw provider errors.
pub const ERROR_CONTENT_KEY: &str = "chat.an_error_occured.text";

/// Top-level config (cloak.toml + CLOAK_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloakConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub kv: KvConfig,
    #[serde(default)]
    pub records: RecordsConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub cache: CacheTuning,
}

impl Default for CloakConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            kv: KvConfig::default(),
            records: RecordsConfig::default(),
            crypto: CryptoConfig::default(),
            cache: CacheTuning::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Shared token presented by clients in the upgrade request.
    pub auth_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            auth_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvConfig {
    #[serde(default = "default_kv_url")]
    pub url: String,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            url: default_kv_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsConfig {
    #[serde(default = "default_records_url")]
    pub base_url: String,
    pub api_token: Option<String>,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            base_url: default_records_url(),
            api_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoConfig {
    #[serde(default = "default_crypto_url")]
    pub base_url: String,
    pub api_token: Option<String>,
    /// Key id the server uses when it must decrypt AI-cache entries for
    /// inference. Distinct from any client content key.
    #[serde(default = "default_ai_key_id")]
    pub ai_inference_key_id: String,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            base_url: default_crypto_url(),
            api_token: None,
            ai_inference_key_id: default_ai_key_id(),
        }
    }
}

/// Cache sizing and TTL tuning. These are configuration, not policy —
/// the Cache Layer treats every value as authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTuning {
    /// Seconds before the per-user chat list sorted set expires.
    #[serde(default = "default_two_days")]
    pub chat_ids_versions_ttl: u64,
    /// Seconds before a per-chat versions hash expires.
    #[serde(default = "default_two_days")]
    pub chat_versions_ttl: u64,
    /// Seconds before a per-chat list-item hash expires.
    #[serde(default = "default_two_days")]
    pub chat_list_item_data_ttl: u64,
    /// Seconds before the vault-encrypted AI message list expires.
    #[serde(default = "default_three_days")]
    pub chat_messages_ttl: u64,
    /// Seconds before a user draft hash expires.
    #[serde(default = "default_two_days")]
    pub user_draft_ttl: u64,
    /// Seconds before the client-encrypted sync message list expires.
    #[serde(default = "default_one_hour")]
    pub sync_messages_ttl: u64,
    /// Seconds before active-task mappings and request queues expire.
    #[serde(default = "default_ten_minutes")]
    pub active_task_ttl: u64,
    /// Seconds before embeds and app-settings entries expire.
    #[serde(default = "default_one_day")]
    pub embed_ttl: u64,
    /// Seconds before a pending permission-request blob expires.
    #[serde(default = "default_seven_days")]
    pub pending_request_ttl: u64,
    /// How many chats keep a warm AI message cache before LRU eviction.
    #[serde(default = "default_top_n")]
    pub top_n_messages_count: usize,
    /// Per-chat bound on the AI message list length.
    #[serde(default = "default_max_history")]
    pub max_ai_history_length: usize,
}

impl Default for CacheTuning {
    fn default() -> Self {
        Self {
            chat_ids_versions_ttl: default_two_days(),
            chat_versions_ttl: default_two_days(),
            chat_list_item_data_ttl: default_two_days(),
            chat_messages_ttl: default_three_days(),
            user_draft_ttl: default_two_days(),
            sync_messages_ttl: default_one_hour(),
            active_task_ttl: default_ten_minutes(),
            embed_ttl: default_one_day(),
            pending_request_ttl: default_seven_days(),
            top_n_messages_count: default_top_n(),
            max_ai_history_length: default_max_history(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_kv_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_records_url() -> String {
    "http://127.0.0.1:8055".to_string()
}
fn default_crypto_url() -> String {
    "http://127.0.0.1:8200".to_string()
}
fn default_ai_key_id() -> String {
    "ai-inference".to_string()
}
fn default_one_hour() -> u64 {
    3600
}
fn default_ten_minutes() -> u64 {
    600
}
fn default_one_day() -> u64 {
    86_400
}
fn default_two_days() -> u64 {
    172_800
}
fn default_three_days() -> u64 {
    259_200
}
fn default_seven_days() -> u64 {
    604_800
}
fn default_top_n() -> usize {
    3
}
fn default_max_history() -> usize {
    500
}

impl CloakConfig {
    /// Load config from a TOML file with CLOAK_* env var overrides.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: CloakConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CLOAK_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cloak/cloak.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_consistent() {
        let cfg = CloakConfig::default();
        assert_eq!(cfg.gateway.port, DEFAULT_PORT);
        assert!(cfg.cache.sync_messages_ttl < cfg.cache.chat_messages_ttl);
        assert!(cfg.cache.top_n_messages_count >= 1);
    }
}
