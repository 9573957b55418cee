//! In-memory crypto double for tests. Reversible tagging instead of real
//! encryption — the core treats ciphertext as opaque, so tests only need
//! round-trip fidelity and key separation.

use async_trait::async_trait;

use crate::error::{CryptoError, Result};
use crate::Crypto;

#[derive(Debug, Default, Clone)]
pub struct MemoryCrypto;

impl MemoryCrypto {
    pub fn new() -> Self {
        Self
    }

    fn seal(key: &str, plaintext: &str) -> String {
        format!("enc:{}:{}", key, plaintext)
    }

    fn open(key: &str, ciphertext: &str) -> Result<String> {
        let prefix = format!("enc:{}:", key);
        ciphertext
            .strip_prefix(&prefix)
            .map(str::to_string)
            .ok_or_else(|| CryptoError::UnknownKey(key.to_string()))
    }
}

#[async_trait]
impl Crypto for MemoryCrypto {
    async fn decrypt_with_chat_key(&self, chat_id: &str, ciphertext: &str) -> Result<String> {
        Self::open(&format!("chat-{}", chat_id), ciphertext)
    }

    async fn decrypt_with_user_draft_key(
        &self,
        user_id: &str,
        ciphertext: &str,
    ) -> Result<String> {
        Self::open(&format!("user-draft-{}", user_id), ciphertext)
    }

    async fn encrypt_with_key(&self, key_id: &str, plaintext: &str) -> Result<(String, u64)> {
        Ok((Self::seal(key_id, plaintext), 1))
    }

    async fn decrypt_with_key(&self, key_id: &str, ciphertext: &str) -> Result<String> {
        Self::open(key_id, ciphertext)
    }
}

/// Helper for tests elsewhere in the workspace: produce ciphertext the
/// double will accept for a chat key.
pub fn seal_for_chat(chat_id: &str, plaintext: &str) -> String {
    MemoryCrypto::seal(&format!("chat-{}", chat_id), plaintext)
}

/// Same, for a user's draft key.
pub fn seal_for_user_draft(user_id: &str, plaintext: &str) -> String {
    MemoryCrypto::seal(&format!("user-draft-{}", user_id), plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_with_named_key() {
        let crypto = MemoryCrypto::new();
        let (ct, version) = crypto.encrypt_with_key("vault-u1", "hello").await.unwrap();
        assert_eq!(version, 1);
        assert_eq!(crypto.decrypt_with_key("vault-u1", &ct).await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn wrong_key_fails() {
        let crypto = MemoryCrypto::new();
        let (ct, _) = crypto.encrypt_with_key("vault-u1", "hello").await.unwrap();
        assert!(crypto.decrypt_with_key("vault-u2", &ct).await.is_err());
    }

    #[tokio::test]
    async fn chat_key_helper_matches_trait_path() {
        let crypto = MemoryCrypto::new();
        let ct = seal_for_chat("c1", "title");
        assert_eq!(
            crypto.decrypt_with_chat_key("c1", &ct).await.unwrap(),
            "title"
        );
    }
}
