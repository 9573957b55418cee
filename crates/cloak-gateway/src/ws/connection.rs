//! The websocket endpoint: upgrade, auth gate, and the per-connection
//! task pair (inbound loop + outbound pump).

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use cloak_core::config::{MAX_PAYLOAD_BYTES, OUTBOUND_CHANNEL_CAPACITY};

use crate::app::AppState;
use crate::auth::{authenticate, ConnectQuery, Identity};
use crate::ws::dispatch;
use crate::ws::manager::Outbound;

const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// GET /v1/ws — authentication happens before the upgrade; a failed gate
/// never reaches the message loop and touches no registry state.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<ConnectQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    match authenticate(&query, &state.config) {
        Some(identity) => {
            ws.on_upgrade(move |socket| handle_connection(socket, state, identity))
                .into_response()
        }
        None => {
            debug!("ws upgrade rejected by auth gate");
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

/// Per-connection task — lives for the entire session lifetime.
async fn handle_connection(socket: WebSocket, state: Arc<AppState>, identity: Identity) {
    let user_id = identity.user_id.as_str().to_string();
    let device = identity.device_hash.as_str().to_string();
    info!(user_id, device, "websocket connected");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOUND_CHANNEL_CAPACITY);
    let generation = state.manager.connect(&user_id, &device, tx);

    // Outbound pump: the single writer to the sink, so per-device send
    // order is exactly queue order.
    let mut pump = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let result = match outbound {
                Outbound::Frame(json) => sink.send(Message::Text(json.into())).await,
                Outbound::Pong(data) => sink.send(Message::Pong(data.into())).await,
                Outbound::Close { code, reason } => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            };
            if result.is_err() {
                break;
            }
        }
    });

    let mut disconnect_reason = "client closed connection".to_string();
    let mut close_queued = false;

    loop {
        tokio::select! {
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let text: &str = &text;
                        if text.len() > MAX_PAYLOAD_BYTES {
                            warn!(user_id, device, size = text.len(), "payload too large, closing");
                            disconnect_reason = "payload too large".to_string();
                            break;
                        }
                        if let Err(e) = dispatch::handle(&state, &identity, text).await {
                            // Only fatal-by-contract handler errors land
                            // here (see dispatch); close 1011.
                            error!(user_id, device, error = %e, "handler error, closing 1011");
                            state
                                .manager
                                .close_device(&user_id, &device, CLOSE_INTERNAL_ERROR, "Internal server error")
                                .await;
                            close_queued = true;
                            disconnect_reason = format!("Unexpected server error: {}", e.code());
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        state
                            .manager
                            .send_pong(&user_id, &device, data.to_vec())
                            .await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        disconnect_reason = match frame {
                            Some(frame) => format!(
                                "Client closed connection - Code: {}, Reason: {}",
                                frame.code,
                                if frame.reason.is_empty() {
                                    "none"
                                } else {
                                    frame.reason.as_str()
                                }
                            ),
                            None => "Client closed connection".to_string(),
                        };
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        disconnect_reason = format!("socket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
            _ = &mut pump => {
                // writer half died; nothing more can be delivered
                disconnect_reason = "outbound pump terminated".to_string();
                break;
            }
        }
    }

    // A queued close frame must reach the wire before the pump dies.
    if close_queued {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(1), &mut pump).await;
    }
    pump.abort();
    state
        .manager
        .disconnect(&user_id, &device, generation, &disconnect_reason);
    info!(user_id, device, reason = %disconnect_reason, "websocket closed");
}
