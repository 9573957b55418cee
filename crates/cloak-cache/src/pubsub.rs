//! Pub/sub bridge between workers and the gateway's listener tasks.

use futures_util::StreamExt;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::ChatCache;

/// One message received from a pattern subscription. `data` is `None`
/// when the payload was not valid JSON — listeners log and move on, per
/// the bus contract that a non-JSON frame is dropped.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub channel: String,
    pub data: Option<Value>,
    pub raw: String,
}

/// A live pattern subscription on its own KV connection. Dropping it
/// closes the subscription.
pub struct BusSubscription {
    pubsub: redis::aio::PubSub,
}

impl BusSubscription {
    /// Wait for the next message. `None` means the connection is gone and
    /// the caller should resubscribe.
    pub async fn next(&mut self) -> Option<BusMessage> {
        let msg = self.pubsub.on_message().next().await?;
        let channel = msg.get_channel_name().to_string();
        let raw: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(_) => return Some(BusMessage {
                channel,
                data: None,
                raw: String::new(),
            }),
        };
        let data = serde_json::from_str(&raw).ok();
        Some(BusMessage { channel, data, raw })
    }
}

impl ChatCache {
    /// Publish a JSON event on a channel. Workers and the gateway share
    /// this envelope: the payload is the event object itself.
    pub async fn publish_event(&self, channel: &str, event: &Value) -> Result<()> {
        let mut conn = self.command_conn();
        let json = serde_json::to_string(event)?;
        let _: () = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(json)
            .query_async(&mut conn)
            .await?;
        debug!(channel, "event published");
        Ok(())
    }

    /// Open a dedicated connection and PSUBSCRIBE to a channel pattern.
    pub async fn subscribe_pattern(&self, pattern: &str) -> Result<BusSubscription> {
        let mut pubsub = self.pubsub_client().get_async_pubsub().await?;
        pubsub.psubscribe(pattern).await?;
        debug!(pattern, "pattern subscription opened");
        Ok(BusSubscription { pubsub })
    }
}
