pub mod events;
pub mod frames;
pub mod messages;
pub mod model;
pub mod sync;

pub use frames::{ProtocolError, ServerFrame};
pub use messages::ClientMessage;
pub use model::{
    AiHistoryMessage, AskSkillRequest, CachedDraft, CachedMessage, ChatListItemData,
    ChatVersions, MessageRole, MessageStatus, PendingPermissionRequest,
};
