use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health — liveness plus a KV round-trip check.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let kv_ok = state.cache.is_cache_primed("__health__").await.is_ok();
    Json(json!({
        "status": if kv_ok { "ok" } else { "degraded" },
        "kv": kv_ok,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
