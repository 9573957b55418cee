//! Long-lived pub/sub subscriber tasks bridging workers to devices.
//!
//! Each listener owns one pattern subscription and translates bus events
//! into Connection Manager sends. They are independent and restartable:
//! a dead subscription or panic logs, sleeps briefly, and resubscribes —
//! a listener loop never exits.

pub mod cache_events;
pub mod chat_stream;
pub mod chat_updates;
pub mod persisted;
pub mod typing;
pub mod user_updates;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::app::AppState;

const RESTART_DELAY: Duration = Duration::from_secs(1);
/// Pause after a handler error so a poison message cannot spin the loop.
pub(crate) const ERROR_BACKOFF: Duration = Duration::from_secs(1);

type ListenerFuture = Pin<Box<dyn Future<Output = cloak_cache::Result<()>> + Send>>;

pub fn spawn_all(state: &Arc<AppState>) {
    spawn_listener("user-cache-events", state.clone(), |s| {
        Box::pin(cache_events::run(s))
    });
    spawn_listener("chat-stream", state.clone(), |s| {
        Box::pin(chat_stream::run(s))
    });
    spawn_listener("ai-typing-indicator", state.clone(), |s| {
        Box::pin(typing::run(s))
    });
    spawn_listener("chat-updates", state.clone(), |s| {
        Box::pin(chat_updates::run(s))
    });
    spawn_listener("ai-message-persisted", state.clone(), |s| {
        Box::pin(persisted::run(s))
    });
    spawn_listener("user-updates", state.clone(), |s| {
        Box::pin(user_updates::run(s))
    });
}

fn spawn_listener(
    name: &'static str,
    state: Arc<AppState>,
    run: fn(Arc<AppState>) -> ListenerFuture,
) {
    tokio::spawn(async move {
        loop {
            info!(listener = name, "starting event-bus listener");
            match run(state.clone()).await {
                Ok(()) => error!(listener = name, "listener stream ended, resubscribing"),
                Err(e) => error!(listener = name, error = %e, "listener failed, resubscribing"),
            }
            tokio::time::sleep(RESTART_DELAY).await;
        }
    });
}
