pub mod chats;
pub mod drafts;
pub mod embeds;
pub mod error;
pub mod keys;
pub mod messages;
pub mod misc;
pub mod policy;
pub mod pubsub;
pub mod settings;
pub mod tasks;

pub use error::{CacheError, Result};
pub use keys::CacheKey;
pub use messages::SavedVersions;
pub use policy::{CachePolicy, Ttl};
pub use pubsub::{BusMessage, BusSubscription};

use redis::aio::ConnectionManager;

/// Typed facade over the KV store. Exclusively owns every key described in
/// [`CacheKey`]; other components never issue raw commands.
///
/// Cloning the inner [`ConnectionManager`] is cheap and yields a handle
/// multiplexed over one connection, so methods clone per call instead of
/// holding a lock.
#[derive(Clone)]
pub struct ChatCache {
    conn: ConnectionManager,
    client: redis::Client,
    policy: CachePolicy,
}

impl ChatCache {
    /// Open the KV connection and wrap it with the given policy.
    pub async fn connect(url: &str, policy: CachePolicy) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            conn,
            client,
            policy,
        })
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub(crate) fn command_conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    pub(crate) fn pubsub_client(&self) -> &redis::Client {
        &self.client
    }
}
