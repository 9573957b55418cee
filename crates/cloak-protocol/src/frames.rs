use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Raw inbound frame — parse the `type` discriminator first, then extract
/// the payload into the matching typed struct.
/// Wire: `{ "type": "update_title", "payload": {...} }`
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub payload: Value,
}

/// Server → Client frame.
/// Wire: `{ "type": "chat_title_updated", "payload": {...} }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ServerFrame {
    pub fn new(frame_type: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            frame_type: frame_type.into(),
            payload: Some(serde_json::to_value(payload).unwrap_or(Value::Null)),
        }
    }

    /// A frame with no payload (e.g. `pong`).
    pub fn bare(frame_type: impl Into<String>) -> Self {
        Self {
            frame_type: frame_type.into(),
            payload: None,
        }
    }

    /// The standard error frame: `{type: "error", payload: {message, chat_id?}}`.
    pub fn error(message: impl Into<String>, chat_id: Option<&str>) -> Self {
        let mut payload = serde_json::json!({ "message": message.into() });
        if let Some(id) = chat_id {
            payload["chat_id"] = Value::String(id.to_string());
        }
        Self::new("error", payload)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Errors produced while decoding an inbound frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON or lacked the `type` discriminator.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The `type` tag names no known client message.
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// The payload did not match the schema for its message type.
    #[error("invalid payload for '{msg_type}': {detail}")]
    InvalidPayload { msg_type: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_frame_carries_chat_id_when_present() {
        let frame = ServerFrame::error("nope", Some("c-1"));
        let json = frame.to_json();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains(r#""chat_id":"c-1""#));
    }

    #[test]
    fn bare_frame_omits_payload() {
        let json = ServerFrame::bare("pong").to_json();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }
}
