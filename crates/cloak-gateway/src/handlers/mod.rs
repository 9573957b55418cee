pub mod ai;
pub mod chats;
pub mod drafts;
pub mod messages;
pub mod metadata;
pub mod phased;
pub mod sync;
pub mod titles;
