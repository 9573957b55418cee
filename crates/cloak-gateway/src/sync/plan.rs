//! Pure delta computation for the initial sync. The handler gathers a
//! snapshot, this module decides what each client is missing, and the
//! handler then decrypts and assembles only what the plan names.

use std::collections::{HashMap, HashSet};

use cloak_protocol::model::ChatVersions;
use cloak_protocol::sync::{ClientChatVersions, SyncChatType};

/// Server-side state for one chat, in recency order within the snapshot.
#[derive(Debug, Clone)]
pub struct ChatSnapshot {
    pub chat_id: String,
    pub last_edited_ts: i64,
    pub versions: ChatVersions,
    /// The requesting user's draft version from the versions hash.
    pub draft_v: Option<i64>,
}

/// What to include for one chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPlan {
    pub chat_id: String,
    pub sync_type: SyncChatType,
    pub include_title: bool,
    pub include_draft: bool,
    /// Only the immediate-view chat gets messages inline.
    pub include_messages: bool,
    pub is_priority: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    pub chat_ids_to_delete: Vec<String>,
    /// Recency order; the priority chat is NOT yet moved to the front —
    /// the handler inserts it at index 0 during assembly.
    pub chats: Vec<ChatPlan>,
    pub server_chat_order: Vec<String>,
}

/// Compare the server snapshot against the client's reported state.
/// Missing client components compare as -1 so any server version wins.
pub fn compute_sync_plan(
    server_chats: &[ChatSnapshot],
    client_chat_ids: &[String],
    client_versions: &HashMap<String, ClientChatVersions>,
    immediate_view_chat_id: Option<&str>,
) -> SyncPlan {
    let server_ids: HashSet<&str> = server_chats.iter().map(|c| c.chat_id.as_str()).collect();

    let chat_ids_to_delete: Vec<String> = client_chat_ids
        .iter()
        .filter(|id| !server_ids.contains(id.as_str()))
        .cloned()
        .collect();

    let server_chat_order: Vec<String> =
        server_chats.iter().map(|c| c.chat_id.clone()).collect();

    let mut chats = Vec::new();
    for snapshot in server_chats {
        let is_priority = immediate_view_chat_id == Some(snapshot.chat_id.as_str());
        let known = client_chat_ids.iter().any(|id| id == &snapshot.chat_id)
            || client_versions.contains_key(&snapshot.chat_id);

        if !known {
            chats.push(ChatPlan {
                chat_id: snapshot.chat_id.clone(),
                sync_type: SyncChatType::NewChat,
                include_title: true,
                include_draft: true,
                include_messages: is_priority,
                is_priority,
            });
            continue;
        }

        let client = client_versions
            .get(&snapshot.chat_id)
            .cloned()
            .unwrap_or_default();
        let include_title = snapshot.versions.title_v > client.title_v.unwrap_or(-1);
        let include_draft = snapshot.draft_v.unwrap_or(0) > client.draft_v.unwrap_or(-1);
        let messages_changed = snapshot.versions.messages_v > client.messages_v.unwrap_or(-1);

        if include_title || include_draft || messages_changed {
            chats.push(ChatPlan {
                chat_id: snapshot.chat_id.clone(),
                sync_type: SyncChatType::UpdatedChat,
                include_title,
                include_draft,
                include_messages: messages_changed && is_priority,
                is_priority,
            });
        }
    }

    SyncPlan {
        chat_ids_to_delete,
        chats,
        server_chat_order,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(chat_id: &str, messages_v: i64, title_v: i64, draft_v: Option<i64>) -> ChatSnapshot {
        ChatSnapshot {
            chat_id: chat_id.to_string(),
            last_edited_ts: 100,
            versions: ChatVersions {
                messages_v,
                title_v,
                extra: Default::default(),
            },
            draft_v,
        }
    }

    fn client(messages_v: i64, title_v: i64, draft_v: Option<i64>) -> ClientChatVersions {
        ClientChatVersions {
            messages_v: Some(messages_v),
            title_v: Some(title_v),
            draft_v,
        }
    }

    #[test]
    fn unknown_server_chat_is_new_with_title_and_draft() {
        let server = vec![snapshot("c1", 1, 1, None)];
        let plan = compute_sync_plan(&server, &[], &HashMap::new(), None);
        assert_eq!(plan.chats.len(), 1);
        let chat = &plan.chats[0];
        assert_eq!(chat.sync_type, SyncChatType::NewChat);
        assert!(chat.include_title && chat.include_draft);
        assert!(!chat.include_messages, "messages only for immediate view");
    }

    #[test]
    fn local_only_chat_is_deleted() {
        let plan = compute_sync_plan(
            &[],
            &["stale".to_string()],
            &HashMap::new(),
            None,
        );
        assert_eq!(plan.chat_ids_to_delete, vec!["stale".to_string()]);
        assert!(plan.chats.is_empty());
    }

    #[test]
    fn stale_title_version_includes_title_only() {
        let server = vec![snapshot("c1", 3, 2, None)];
        let ids = vec!["c1".to_string()];
        let mut versions = HashMap::new();
        versions.insert("c1".to_string(), client(3, 1, None));
        let plan = compute_sync_plan(&server, &ids, &versions, None);
        let chat = &plan.chats[0];
        assert_eq!(chat.sync_type, SyncChatType::UpdatedChat);
        assert!(chat.include_title);
        assert!(!chat.include_draft);
        assert!(!chat.include_messages);
    }

    #[test]
    fn messages_inline_only_for_immediate_view() {
        let server = vec![snapshot("c1", 5, 1, None), snapshot("c2", 5, 1, None)];
        let ids = vec!["c1".to_string(), "c2".to_string()];
        let mut versions = HashMap::new();
        versions.insert("c1".to_string(), client(3, 1, None));
        versions.insert("c2".to_string(), client(3, 1, None));
        let plan = compute_sync_plan(&server, &ids, &versions, Some("c2"));
        let c1 = plan.chats.iter().find(|c| c.chat_id == "c1").unwrap();
        let c2 = plan.chats.iter().find(|c| c.chat_id == "c2").unwrap();
        assert!(!c1.include_messages);
        assert!(c2.include_messages && c2.is_priority);
    }

    #[test]
    fn up_to_date_chat_is_omitted() {
        let server = vec![snapshot("c1", 2, 1, Some(4))];
        let ids = vec!["c1".to_string()];
        let mut versions = HashMap::new();
        versions.insert("c1".to_string(), client(2, 1, Some(4)));
        let plan = compute_sync_plan(&server, &ids, &versions, None);
        assert!(plan.chats.is_empty());
        assert_eq!(plan.server_chat_order, vec!["c1".to_string()]);
    }

    #[test]
    fn newer_draft_version_includes_draft() {
        let server = vec![snapshot("c1", 2, 1, Some(5))];
        let ids = vec!["c1".to_string()];
        let mut versions = HashMap::new();
        versions.insert("c1".to_string(), client(2, 1, Some(3)));
        let plan = compute_sync_plan(&server, &ids, &versions, None);
        assert!(plan.chats[0].include_draft);
        assert!(!plan.chats[0].include_title);
    }

    #[test]
    fn order_follows_server_recency() {
        let server = vec![snapshot("newer", 1, 1, None), snapshot("older", 1, 1, None)];
        let plan = compute_sync_plan(&server, &[], &HashMap::new(), None);
        assert_eq!(
            plan.server_chat_order,
            vec!["newer".to_string(), "older".to_string()]
        );
    }
}
