//! Live-connection registry: which devices of which users are connected,
//! what chat each device has focused, and how to reach them.

use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use cloak_core::config::DISCONNECT_GRACE_SECS;
use cloak_protocol::frames::ServerFrame;

/// What travels down a connection's outbound queue. Per-device send order
/// follows from the queue being the only writer path to the socket.
#[derive(Debug)]
pub enum Outbound {
    Frame(String),
    Pong(Vec<u8>),
    Close { code: u16, reason: String },
}

struct ConnectionHandle {
    sender: mpsc::Sender<Outbound>,
    /// Monotonic id distinguishing this connection from a reconnect on
    /// the same (user, device). Grace cleanup only removes the entry it
    /// scheduled for.
    generation: u64,
}

/// Tracks every live websocket keyed by `(user_id, device_fp_hash)` plus
/// each device's active chat. Mutations are serialized per user bucket by
/// the dashmap entry lock.
pub struct ConnectionManager {
    conns: DashMap<String, HashMap<String, ConnectionHandle>>,
    active_chats: DashMap<(String, String), String>,
    next_generation: AtomicU64,
    grace: Duration,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::with_grace(Duration::from_secs(DISCONNECT_GRACE_SECS))
    }

    pub fn with_grace(grace: Duration) -> Self {
        Self {
            conns: DashMap::new(),
            active_chats: DashMap::new(),
            next_generation: AtomicU64::new(1),
            grace,
        }
    }

    /// Register a connection. Returns its generation, which the owning
    /// socket task passes back on disconnect. A racing reconnect simply
    /// replaces the handle — the old generation's cleanup then no-ops.
    pub fn connect(&self, user_id: &str, device: &str, sender: mpsc::Sender<Outbound>) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        self.conns.entry(user_id.to_string()).or_default().insert(
            device.to_string(),
            ConnectionHandle { sender, generation },
        );
        info!(user_id, device, "device connected");
        generation
    }

    /// Schedule removal after the grace window unless a newer connection
    /// for the same (user, device) won the race.
    pub fn disconnect(self: &Arc<Self>, user_id: &str, device: &str, generation: u64, reason: &str) {
        debug!(user_id, device, reason, "disconnect scheduled");
        let manager = Arc::clone(self);
        let user_id = user_id.to_string();
        let device = device.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(manager.grace).await;
            manager.remove_if_stale(&user_id, &device, generation);
        });
    }

    fn remove_if_stale(&self, user_id: &str, device: &str, generation: u64) {
        let mut removed = false;
        if let Some(mut devices) = self.conns.get_mut(user_id) {
            if devices
                .get(device)
                .map(|handle| handle.generation == generation)
                .unwrap_or(false)
            {
                devices.remove(device);
                removed = true;
            }
            if devices.is_empty() {
                drop(devices);
                self.conns
                    .remove_if(user_id, |_, devices| devices.is_empty());
            }
        }
        if removed {
            self.active_chats
                .remove(&(user_id.to_string(), device.to_string()));
            info!(user_id, device, "device removed after grace window");
        }
    }

    /// Send one frame to one device. Fails soft: an absent or congested
    /// device is logged and skipped.
    pub async fn send_personal(&self, frame: &ServerFrame, user_id: &str, device: &str) {
        self.send_personal_json(frame.to_json(), user_id, device)
            .await;
    }

    pub async fn send_personal_json(&self, json: String, user_id: &str, device: &str) {
        let sender = self
            .conns
            .get(user_id)
            .and_then(|devices| devices.get(device).map(|h| h.sender.clone()));
        match sender {
            Some(sender) => {
                if let Err(e) = sender.send(Outbound::Frame(json)).await {
                    warn!(user_id, device, error = %e, "send to device failed");
                }
            }
            None => debug!(user_id, device, "send skipped, device not connected"),
        }
    }

    /// Deliver a frame to every device of a user, optionally excluding
    /// one. A failed send never aborts the rest of the loop.
    pub async fn broadcast_to_user(
        &self,
        frame: &ServerFrame,
        user_id: &str,
        exclude_device: Option<&str>,
    ) {
        let json = frame.to_json();
        let targets: Vec<(String, mpsc::Sender<Outbound>)> = match self.conns.get(user_id) {
            Some(devices) => devices
                .iter()
                .filter(|(device, _)| Some(device.as_str()) != exclude_device)
                .map(|(device, handle)| (device.clone(), handle.sender.clone()))
                .collect(),
            None => return,
        };
        for (device, sender) in targets {
            if let Err(e) = sender.send(Outbound::Frame(json.clone())).await {
                warn!(user_id, device, error = %e, "broadcast send failed, continuing");
            }
        }
    }

    /// Wrap `{type: event_name, payload}` and deliver to every device.
    pub async fn broadcast_event(&self, user_id: &str, event_name: &str, payload: Value) {
        let frame = ServerFrame::new(event_name, payload);
        self.broadcast_to_user(&frame, user_id, None).await;
    }

    pub fn set_active_chat(&self, user_id: &str, device: &str, chat_id: Option<String>) {
        let key = (user_id.to_string(), device.to_string());
        match chat_id {
            Some(chat_id) => {
                self.active_chats.insert(key, chat_id);
            }
            None => {
                self.active_chats.remove(&key);
            }
        }
    }

    pub fn get_active_chat(&self, user_id: &str, device: &str) -> Option<String> {
        self.active_chats
            .get(&(user_id.to_string(), device.to_string()))
            .map(|entry| entry.clone())
    }

    /// Device hashes of every live connection for a user.
    pub fn connections_for_user(&self, user_id: &str) -> Vec<String> {
        self.conns
            .get(user_id)
            .map(|devices| devices.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Answer a websocket ping through the device's outbound queue.
    pub async fn send_pong(&self, user_id: &str, device: &str, data: Vec<u8>) {
        let sender = self
            .conns
            .get(user_id)
            .and_then(|devices| devices.get(device).map(|h| h.sender.clone()));
        if let Some(sender) = sender {
            let _ = sender.send(Outbound::Pong(data)).await;
        }
    }

    /// Send a close to one device's socket task (used for 1011 shutdown).
    pub async fn close_device(&self, user_id: &str, device: &str, code: u16, reason: &str) {
        let sender = self
            .conns
            .get(user_id)
            .and_then(|devices| devices.get(device).map(|h| h.sender.clone()));
        if let Some(sender) = sender {
            let _ = sender
                .send(Outbound::Close {
                    code,
                    reason: reason.to_string(),
                })
                .await;
        }
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
        mpsc::channel(16)
    }

    async fn recv_frame(rx: &mut mpsc::Receiver<Outbound>) -> String {
        match rx.recv().await.expect("frame expected") {
            Outbound::Frame(json) => json,
            other => panic!("unexpected outbound: {other:?}"),
        }
    }

    #[tokio::test]
    async fn broadcast_excludes_named_device() {
        let manager = Arc::new(ConnectionManager::new());
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        manager.connect("u1", "d1", tx1);
        manager.connect("u1", "d2", tx2);

        let frame = ServerFrame::new("chat_deleted", serde_json::json!({"chat_id": "c1"}));
        manager.broadcast_to_user(&frame, "u1", Some("d1")).await;

        let json = recv_frame(&mut rx2).await;
        assert!(json.contains("chat_deleted"));
        assert!(rx1.try_recv().is_err(), "excluded device must not receive");
    }

    #[tokio::test]
    async fn broadcast_reaches_all_without_exclusion() {
        let manager = Arc::new(ConnectionManager::new());
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        manager.connect("u1", "d1", tx1);
        manager.connect("u1", "d2", tx2);

        manager
            .broadcast_event("u1", "cache_primed", serde_json::json!({"status": "ok"}))
            .await;
        assert!(recv_frame(&mut rx1).await.contains("cache_primed"));
        assert!(recv_frame(&mut rx2).await.contains("cache_primed"));
    }

    #[tokio::test]
    async fn dead_device_does_not_abort_broadcast() {
        let manager = Arc::new(ConnectionManager::new());
        let (tx1, rx1) = channel();
        let (tx2, mut rx2) = channel();
        manager.connect("u1", "d1", tx1);
        manager.connect("u1", "d2", tx2);
        drop(rx1); // d1's socket task is gone

        let frame = ServerFrame::bare("pong");
        manager.broadcast_to_user(&frame, "u1", None).await;
        assert!(recv_frame(&mut rx2).await.contains("pong"));
    }

    #[tokio::test]
    async fn send_personal_to_absent_device_is_soft() {
        let manager = Arc::new(ConnectionManager::new());
        let frame = ServerFrame::bare("pong");
        // no panic, no error surfaced
        manager.send_personal(&frame, "ghost", "d1").await;
    }

    #[tokio::test]
    async fn active_chat_tracking() {
        let manager = Arc::new(ConnectionManager::new());
        let (tx, _rx) = channel();
        manager.connect("u1", "d1", tx);
        manager.set_active_chat("u1", "d1", Some("c9".to_string()));
        assert_eq!(manager.get_active_chat("u1", "d1").as_deref(), Some("c9"));
        manager.set_active_chat("u1", "d1", None);
        assert_eq!(manager.get_active_chat("u1", "d1"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn grace_window_removes_stale_entry() {
        let manager = Arc::new(ConnectionManager::with_grace(Duration::from_millis(50)));
        let (tx, _rx) = channel();
        let generation = manager.connect("u1", "d1", tx);
        manager.set_active_chat("u1", "d1", Some("c1".to_string()));
        manager.disconnect("u1", "d1", generation, "client closed");

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(manager.connections_for_user("u1").is_empty());
        assert_eq!(manager.get_active_chat("u1", "d1"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_within_grace_survives_cleanup() {
        let manager = Arc::new(ConnectionManager::with_grace(Duration::from_millis(50)));
        let (tx_old, _rx_old) = channel();
        let generation = manager.connect("u1", "d1", tx_old);
        manager.disconnect("u1", "d1", generation, "client closed");

        // reconnect races the grace timer
        let (tx_new, mut rx_new) = channel();
        manager.connect("u1", "d1", tx_new);
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(manager.connections_for_user("u1"), vec!["d1".to_string()]);
        let frame = ServerFrame::bare("pong");
        manager.send_personal(&frame, "u1", "d1").await;
        assert!(recv_frame(&mut rx_new).await.contains("pong"));
    }
}
