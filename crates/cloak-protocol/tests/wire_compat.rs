// Verify wire format matches what deployed clients expect.
// These tests ensure protocol compatibility is never broken.

use cloak_protocol::frames::ServerFrame;
use cloak_protocol::messages::{ClientMessage, SyncPhase};
use cloak_protocol::model::{ChatVersions, MessageRole, MessageStatus};
use cloak_protocol::sync::{ChatSyncData, InitialSyncResponsePayload, SyncChatType};

#[test]
fn server_frame_shape() {
    let frame = ServerFrame::new("chat_deleted", serde_json::json!({"chat_id": "c1", "tombstone": true}));
    let json = frame.to_json();
    assert!(json.contains(r#""type":"chat_deleted""#));
    assert!(json.contains(r#""tombstone":true"#));
}

#[test]
fn pong_has_no_payload_key() {
    assert_eq!(ServerFrame::bare("pong").to_json(), r#"{"type":"pong"}"#);
}

#[test]
fn update_title_round_trip() {
    let raw = r#"{"type":"update_title","payload":{"chat_id":"c9","encrypted_title":"enc:T"}}"#;
    match ClientMessage::parse(raw).unwrap() {
        ClientMessage::UpdateTitle(t) => {
            assert_eq!(t.chat_id, "c9");
            assert_eq!(t.encrypted_title, "enc:T");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn cancel_ai_task_requires_task_id() {
    let raw = r#"{"type":"cancel_ai_task","payload":{}}"#;
    assert!(ClientMessage::parse(raw).is_err());
}

#[test]
fn phased_sync_phase_names() {
    for (wire, expected) in [
        ("phase1", SyncPhase::Phase1),
        ("phase2", SyncPhase::Phase2),
        ("phase3", SyncPhase::Phase3),
        ("all", SyncPhase::All),
    ] {
        let raw = format!(r#"{{"type":"phased_sync_request","payload":{{"phase":"{wire}"}}}}"#);
        match ClientMessage::parse(&raw).unwrap() {
            ClientMessage::PhasedSyncRequest(req) => assert_eq!(req.phase, expected),
            other => panic!("unexpected: {other:?}"),
        }
    }
}

#[test]
fn initial_sync_response_serializes_chat_type_snake_case() {
    let payload = InitialSyncResponsePayload {
        chat_ids_to_delete: vec!["dead".to_string()],
        chats_to_add_or_update: vec![ChatSyncData {
            chat_id: "c1".to_string(),
            sync_type: SyncChatType::NewChat,
            versions: ChatVersions {
                messages_v: 1,
                title_v: 1,
                extra: Default::default(),
            },
            last_edited_overall_timestamp: 99,
            unread_count: 0,
            title: Some("hello".to_string()),
            draft_md: None,
            encrypted_chat_key: None,
            encrypted_icon: None,
            encrypted_category: None,
            pinned: None,
            messages: None,
        }],
        server_chat_order: vec!["c1".to_string()],
        server_timestamp: 1234,
    };
    let json = serde_json::to_string(&payload).unwrap();
    assert!(json.contains(r#""type":"new_chat""#));
    assert!(json.contains(r#""server_chat_order":["c1"]"#));
    // absent optional fields must not appear on the wire
    assert!(!json.contains("draft_md"));
}

#[test]
fn versions_flatten_draft_fields_on_wire() {
    let mut versions = ChatVersions {
        messages_v: 5,
        title_v: 2,
        extra: Default::default(),
    };
    versions.extra.insert("user_draft_v:u-1".to_string(), 3);
    let json = serde_json::to_string(&versions).unwrap();
    assert!(json.contains(r#""user_draft_v:u-1":3"#));

    let back: ChatVersions = serde_json::from_str(&json).unwrap();
    assert_eq!(back.draft_version_for("u-1"), Some(3));
}

#[test]
fn role_and_status_wire_spelling() {
    assert_eq!(serde_json::to_string(&MessageRole::Assistant).unwrap(), r#""assistant""#);
    assert_eq!(serde_json::to_string(&MessageStatus::Streaming).unwrap(), r#""streaming""#);
}

#[test]
fn set_active_chat_accepts_null_chat_id() {
    let raw = r#"{"type":"set_active_chat","payload":{"chat_id":null}}"#;
    match ClientMessage::parse(raw).unwrap() {
        ClientMessage::SetActiveChat(s) => assert!(s.chat_id.is_none()),
        other => panic!("unexpected: {other:?}"),
    }
}
