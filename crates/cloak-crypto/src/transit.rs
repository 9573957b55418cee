//! HTTP client for the transit-style key service: keys are addressed by
//! name, plaintext/ciphertext travel in JSON bodies, key material never
//! leaves the service.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use crate::error::{CryptoError, Result};
use crate::Crypto;

pub struct TransitCrypto {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl TransitCrypto {
    pub fn new(base_url: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
        }
    }

    fn chat_key_name(chat_id: &str) -> String {
        format!("chat-{}", chat_id)
    }

    fn user_draft_key_name(user_id: &str) -> String {
        format!("user-draft-{}", user_id)
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let mut builder = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(&body);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CryptoError::UnknownKey(path.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CryptoError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

#[derive(Deserialize)]
struct EncryptResponse {
    ciphertext: String,
    #[serde(default = "default_key_version")]
    key_version: u64,
}

#[derive(Deserialize)]
struct DecryptResponse {
    plaintext: String,
}

fn default_key_version() -> u64 {
    1
}

#[async_trait]
impl Crypto for TransitCrypto {
    async fn decrypt_with_chat_key(&self, chat_id: &str, ciphertext: &str) -> Result<String> {
        self.decrypt_with_key(&Self::chat_key_name(chat_id), ciphertext)
            .await
    }

    async fn decrypt_with_user_draft_key(
        &self,
        user_id: &str,
        ciphertext: &str,
    ) -> Result<String> {
        self.decrypt_with_key(&Self::user_draft_key_name(user_id), ciphertext)
            .await
    }

    async fn encrypt_with_key(&self, key_id: &str, plaintext: &str) -> Result<(String, u64)> {
        let response = self
            .post(
                &format!("/v1/transit/encrypt/{}", key_id),
                json!({ "plaintext": plaintext }),
            )
            .await?;
        let body: EncryptResponse = response
            .json()
            .await
            .map_err(|e| CryptoError::Malformed(e.to_string()))?;
        Ok((body.ciphertext, body.key_version))
    }

    async fn decrypt_with_key(&self, key_id: &str, ciphertext: &str) -> Result<String> {
        let response = self
            .post(
                &format!("/v1/transit/decrypt/{}", key_id),
                json!({ "ciphertext": ciphertext }),
            )
            .await?;
        let body: DecryptResponse = response
            .json()
            .await
            .map_err(|e| CryptoError::Malformed(e.to_string()))?;
        Ok(body.plaintext)
    }
}
