pub mod config;
pub mod error;
pub mod types;

pub use config::CloakConfig;
pub use error::{CoreError, Result};
pub use types::{ChatId, DeviceHash, EmbedId, MessageId, TaskId, UserId, UserIdHash};
