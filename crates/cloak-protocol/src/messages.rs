use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::frames::{Envelope, ProtocolError};
use crate::sync::ClientChatVersions;

/// Every message a client may send over the socket, keyed by the `type`
/// discriminator. Unknown tags fail parsing with
/// [`ProtocolError::UnknownType`] and are answered with a bad-request
/// frame — they never reach a handler.
#[derive(Debug, Clone)]
pub enum ClientMessage {
    InitialSyncRequest(InitialSyncRequest),
    UpdateDraft(UpdateDraft),
    UpdateTitle(UpdateTitle),
    ChatMessageAdded(ChatMessageAdded),
    DeleteChat(DeleteChat),
    DeleteDraft(DeleteDraft),
    GetChatMessages(GetChatMessages),
    RequestChatContentBatch(RequestChatContentBatch),
    SetActiveChat(SetActiveChat),
    CancelAiTask(CancelAiTask),
    AiResponseCompleted(AiResponseCompleted),
    EncryptedChatMetadata(EncryptedChatMetadata),
    UpdatePostProcessingMetadata(UpdatePostProcessingMetadata),
    PhasedSyncRequest(PhasedSyncRequest),
    SyncStatusRequest,
    AppSettingsMemoriesConfirmed(AppSettingsMemoriesConfirmed),
    ScrollPositionUpdate(ScrollPositionUpdate),
    ChatReadStatusUpdate(ChatReadStatusUpdate),
    Ping,
}

impl ClientMessage {
    /// Decode one inbound text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        Self::from_envelope(envelope)
    }

    fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        fn payload<T: serde::de::DeserializeOwned>(
            msg_type: &str,
            value: Value,
        ) -> Result<T, ProtocolError> {
            // An absent payload is treated as an empty object so payloads
            // made entirely of optional fields still parse.
            let value = if value.is_null() {
                Value::Object(Default::default())
            } else {
                value
            };
            serde_json::from_value(value).map_err(|e| ProtocolError::InvalidPayload {
                msg_type: msg_type.to_string(),
                detail: e.to_string(),
            })
        }

        let t = envelope.msg_type.as_str();
        let msg = match t {
            "initial_sync_request" => {
                ClientMessage::InitialSyncRequest(payload(t, envelope.payload)?)
            }
            "update_draft" => ClientMessage::UpdateDraft(payload(t, envelope.payload)?),
            "update_title" => ClientMessage::UpdateTitle(payload(t, envelope.payload)?),
            "chat_message_added" => ClientMessage::ChatMessageAdded(payload(t, envelope.payload)?),
            "delete_chat" => ClientMessage::DeleteChat(payload(t, envelope.payload)?),
            "delete_draft" => ClientMessage::DeleteDraft(payload(t, envelope.payload)?),
            "get_chat_messages" => ClientMessage::GetChatMessages(payload(t, envelope.payload)?),
            "request_chat_content_batch" => {
                ClientMessage::RequestChatContentBatch(payload(t, envelope.payload)?)
            }
            "set_active_chat" => ClientMessage::SetActiveChat(payload(t, envelope.payload)?),
            "cancel_ai_task" => ClientMessage::CancelAiTask(payload(t, envelope.payload)?),
            "ai_response_completed" => {
                ClientMessage::AiResponseCompleted(payload(t, envelope.payload)?)
            }
            "encrypted_chat_metadata" => {
                ClientMessage::EncryptedChatMetadata(payload(t, envelope.payload)?)
            }
            "update_post_processing_metadata" => {
                ClientMessage::UpdatePostProcessingMetadata(payload(t, envelope.payload)?)
            }
            "phased_sync_request" => {
                ClientMessage::PhasedSyncRequest(payload(t, envelope.payload)?)
            }
            "sync_status_request" => ClientMessage::SyncStatusRequest,
            "app_settings_memories_confirmed" => {
                ClientMessage::AppSettingsMemoriesConfirmed(payload(t, envelope.payload)?)
            }
            "scroll_position_update" => {
                ClientMessage::ScrollPositionUpdate(payload(t, envelope.payload)?)
            }
            "chat_read_status_update" => {
                ClientMessage::ChatReadStatusUpdate(payload(t, envelope.payload)?)
            }
            "ping" => ClientMessage::Ping,
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        };
        Ok(msg)
    }
}

/// `initial_sync_request`. The required fields stay optional here because
/// their absence must produce an `initial_sync_error` frame, not a generic
/// parse failure.
#[derive(Debug, Clone, Deserialize)]
pub struct InitialSyncRequest {
    pub chat_ids: Option<Vec<String>>,
    pub chat_count: Option<i64>,
    #[serde(default)]
    pub chat_versions: HashMap<String, ClientChatVersions>,
    pub last_sync_timestamp: Option<i64>,
    pub immediate_view_chat_id: Option<String>,
    pub pending_message_ids: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateDraft {
    pub chat_id: String,
    pub encrypted_draft_md: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTitle {
    pub chat_id: String,
    pub encrypted_title: String,
}

/// `chat_message_added` — client-encrypted message persisted and
/// rebroadcast to sibling devices. Unknown fields round-trip through
/// `extra` so the sibling broadcast forwards the payload faithfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessageAdded {
    #[serde(rename = "chatId")]
    pub chat_id: String,
    pub message_id: String,
    pub encrypted_content: String,
    pub sender_name: String,
    pub created_at: i64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteChat {
    #[serde(rename = "chatId")]
    pub chat_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteDraft {
    #[serde(rename = "chatId")]
    pub chat_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetChatMessages {
    pub chat_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestChatContentBatch {
    #[serde(default)]
    pub chat_ids: Vec<String>,
}

/// `set_active_chat` — `chat_id: None` means no chat is focused.
#[derive(Debug, Clone, Deserialize)]
pub struct SetActiveChat {
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelAiTask {
    pub task_id: String,
}

/// The client-encrypted assistant message inside `ai_response_completed`.
/// `content` is captured only so the handler can strip it — plaintext is
/// never processed.
#[derive(Debug, Clone, Deserialize)]
pub struct AiResponseMessage {
    pub message_id: Option<String>,
    pub role: Option<String>,
    pub encrypted_content: Option<String>,
    pub encrypted_sender_name: Option<String>,
    pub encrypted_category: Option<String>,
    pub encrypted_model_name: Option<String>,
    pub created_at: Option<i64>,
    pub user_message_id: Option<String>,
    pub content: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiResponseCompleted {
    pub chat_id: Option<String>,
    pub message: Option<AiResponseMessage>,
    pub versions: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetadataVersions {
    pub messages_v: Option<i64>,
    pub title_v: Option<i64>,
    pub last_edited_overall_timestamp: Option<i64>,
}

/// `encrypted_chat_metadata` — user message + per-chat blobs produced by
/// preprocessing. `content` is captured only to be stripped.
#[derive(Debug, Clone, Deserialize)]
pub struct EncryptedChatMetadata {
    pub chat_id: Option<String>,
    pub message_id: Option<String>,
    pub encrypted_content: Option<String>,
    pub encrypted_sender_name: Option<String>,
    pub encrypted_category: Option<String>,
    pub encrypted_title: Option<String>,
    pub encrypted_icon: Option<String>,
    pub encrypted_chat_category: Option<String>,
    pub encrypted_chat_tags: Option<String>,
    pub encrypted_chat_key: Option<String>,
    pub created_at: Option<i64>,
    #[serde(default)]
    pub versions: MetadataVersions,
    pub content: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdatePostProcessingMetadata {
    pub chat_id: Option<String>,
    pub encrypted_follow_up_suggestions: Option<String>,
    #[serde(default)]
    pub encrypted_new_chat_suggestions: Vec<String>,
    pub encrypted_chat_summary: Option<String>,
    pub encrypted_chat_tags: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Phase1,
    Phase2,
    Phase3,
    All,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhasedSyncRequest {
    #[serde(default = "default_phase")]
    pub phase: SyncPhase,
}

fn default_phase() -> SyncPhase {
    SyncPhase::All
}

/// One confirmed settings/memories entry, decrypted client-side. The
/// server re-encrypts the content under the user's vault key before it
/// touches the cache.
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettingsMemoryItem {
    pub app_id: Option<String>,
    pub item_key: Option<String>,
    pub content: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppSettingsMemoriesConfirmed {
    pub chat_id: Option<String>,
    #[serde(default)]
    pub app_settings_memories: Vec<AppSettingsMemoryItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScrollPositionUpdate {
    pub chat_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatReadStatusUpdate {
    pub chat_id: String,
    #[serde(default)]
    pub unread_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_parses_without_payload() {
        assert!(matches!(
            ClientMessage::parse(r#"{"type":"ping"}"#),
            Ok(ClientMessage::Ping)
        ));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let err = ClientMessage::parse(r#"{"type":"mystery","payload":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownType(t) if t == "mystery"));
    }

    #[test]
    fn initial_sync_accepts_missing_required_fields() {
        // Required-field enforcement happens in the handler so the client
        // gets initial_sync_error rather than a parse failure.
        let msg = ClientMessage::parse(r#"{"type":"initial_sync_request","payload":{}}"#).unwrap();
        match msg {
            ClientMessage::InitialSyncRequest(req) => {
                assert!(req.chat_ids.is_none());
                assert!(req.chat_count.is_none());
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn delete_chat_uses_camel_case_chat_id() {
        let msg =
            ClientMessage::parse(r#"{"type":"delete_chat","payload":{"chatId":"c-1"}}"#).unwrap();
        match msg {
            ClientMessage::DeleteChat(del) => assert_eq!(del.chat_id, "c-1"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn chat_message_added_round_trips_extra_fields() {
        let raw = r#"{"type":"chat_message_added","payload":{"chatId":"c-1","message_id":"m-1","encrypted_content":"enc","sender_name":"alice","created_at":10,"custom_flag":true}}"#;
        let msg = ClientMessage::parse(raw).unwrap();
        match msg {
            ClientMessage::ChatMessageAdded(added) => {
                let back = serde_json::to_value(&added).unwrap();
                assert_eq!(back["chatId"], "c-1");
                assert_eq!(back["custom_flag"], true);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn phased_sync_defaults_to_all() {
        let msg =
            ClientMessage::parse(r#"{"type":"phased_sync_request","payload":{}}"#).unwrap();
        match msg {
            ClientMessage::PhasedSyncRequest(req) => assert_eq!(req.phase, SyncPhase::All),
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
