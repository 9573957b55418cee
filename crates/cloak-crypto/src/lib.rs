pub mod error;
pub mod memory;
pub mod transit;

pub use error::{CryptoError, Result};
pub use memory::MemoryCrypto;
pub use transit::TransitCrypto;

use async_trait::async_trait;

/// The external key service. It holds per-chat and per-user keys by name;
/// the core hands it ciphertext or plaintext and a key reference, never
/// key material. The dedicated AI-inference key used to read the AI cache
/// is distinct from any client content key.
#[async_trait]
pub trait Crypto: Send + Sync {
    /// Decrypt a blob under the chat's key (title transport to the
    /// owner's own device).
    async fn decrypt_with_chat_key(&self, chat_id: &str, ciphertext: &str) -> Result<String>;

    /// Decrypt a blob under the user's draft key.
    async fn decrypt_with_user_draft_key(&self, user_id: &str, ciphertext: &str)
        -> Result<String>;

    /// Encrypt plaintext under a named key. Returns the ciphertext and
    /// the key version it was produced with.
    async fn encrypt_with_key(&self, key_id: &str, plaintext: &str) -> Result<(String, u64)>;

    /// Decrypt ciphertext under a named key.
    async fn decrypt_with_key(&self, key_id: &str, ciphertext: &str) -> Result<String>;
}
