use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use cloak_cache::{CachePolicy, ChatCache};
use cloak_core::config::CloakConfig;
use cloak_crypto::{Crypto, TransitCrypto};
use cloak_jobs::JobQueue;
use cloak_records::{HttpRecords, Records};

use crate::ws::manager::ConnectionManager;

/// Central shared state — passed as Arc<AppState> to all handlers and
/// listener tasks. Handlers name exactly the collaborators they use.
pub struct AppState {
    pub config: CloakConfig,
    pub cache: ChatCache,
    pub records: Arc<dyn Records>,
    pub crypto: Arc<dyn Crypto>,
    pub jobs: JobQueue,
    pub manager: Arc<ConnectionManager>,
}

impl AppState {
    /// Wire every subsystem from config.
    pub async fn build(config: CloakConfig) -> anyhow::Result<Self> {
        let policy = CachePolicy::from(&config.cache);
        let cache = ChatCache::connect(&config.kv.url, policy).await?;
        let jobs = JobQueue::connect(&config.kv.url).await?;
        let records: Arc<dyn Records> = Arc::new(HttpRecords::new(
            config.records.base_url.clone(),
            config.records.api_token.clone(),
        ));
        let crypto: Arc<dyn Crypto> = Arc::new(TransitCrypto::new(
            config.crypto.base_url.clone(),
            config.crypto.api_token.clone(),
        ));
        Ok(Self {
            config,
            cache,
            records,
            crypto,
            jobs,
            manager: Arc::new(ConnectionManager::new()),
        })
    }
}

/// Assemble the full router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/v1/ask", post(crate::http::ask::ask_handler))
        .route("/v1/ws", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
