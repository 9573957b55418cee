//! HTTP client for the Records Store's REST API.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{RecordsError, Result};
use crate::types::{ChatRecord, UserProfile, WarmChatEntry};
use crate::Records;

/// Records client against a document-store REST API
/// (`/items/{collection}` routes, bearer-token auth).
pub struct HttpRecords {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpRecords {
    pub fn new(base_url: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let response = self.request(reqwest::Method::GET, path).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        let body: DataEnvelope<T> = response
            .json()
            .await
            .map_err(|e| RecordsError::Malformed(e.to_string()))?;
        Ok(Some(body.data))
    }
}

/// The store wraps every response body in `{"data": ...}`.
#[derive(serde::Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(RecordsError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl Records for HttpRecords {
    async fn chat_metadata(&self, chat_id: &str) -> Result<Option<ChatRecord>> {
        self.get_json(&format!("/items/chats/{}", chat_id)).await
    }

    async fn check_chat_ownership(&self, chat_id: &str, user_id_hash: &str) -> Result<bool> {
        match self.chat_metadata(chat_id).await? {
            Some(chat) => Ok(chat.hashed_user_id == user_id_hash),
            None => Ok(false),
        }
    }

    async fn messages_for_chat(&self, chat_id: &str) -> Result<Vec<String>> {
        let path = format!(
            "/items/messages?filter[chat_id][_eq]={}&sort=created_at&limit=-1",
            chat_id
        );
        let rows: Option<Vec<Value>> = self.get_json(&path).await?;
        let rows = rows.unwrap_or_default();
        debug!(chat_id, count = rows.len(), "fetched persisted messages");
        Ok(rows
            .into_iter()
            .map(|row| serde_json::to_string(&row).unwrap_or_default())
            .collect())
    }

    async fn user_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.get_json(&format!(
            "/users/{}?fields=last_opened,vault_key_id",
            user_id
        ))
        .await
    }

    async fn update_user(&self, user_id: &str, patch: &Value) -> Result<()> {
        let response = self
            .request(reqwest::Method::PATCH, &format!("/users/{}", user_id))
            .json(patch)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn find_draft(&self, user_id_hash: &str, chat_id: &str) -> Result<Option<String>> {
        let path = format!(
            "/items/drafts?filter[hashed_user_id][_eq]={}&filter[chat_id][_eq]={}&fields=id&limit=1",
            user_id_hash, chat_id
        );
        let rows: Option<Vec<Value>> = self.get_json(&path).await?;
        Ok(rows
            .unwrap_or_default()
            .first()
            .and_then(|row| row.get("id"))
            .and_then(|id| id.as_str())
            .map(str::to_string))
    }

    async fn delete_draft(&self, draft_id: &str) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::DELETE,
                &format!("/items/drafts/{}", draft_id),
            )
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn chats_for_warming(
        &self,
        user_id_hash: &str,
        limit: usize,
    ) -> Result<Vec<WarmChatEntry>> {
        let path = format!(
            "/items/chats?filter[hashed_user_id][_eq]={}&sort=-last_edited_overall_timestamp&limit={}&deep[drafts][_limit]=1",
            user_id_hash, limit
        );
        let rows: Option<Vec<WarmChatEntry>> = self.get_json(&path).await?;
        Ok(rows.unwrap_or_default())
    }

    async fn update_chat_read_status(&self, chat_id: &str, unread_count: i64) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::PATCH,
                &format!("/items/chats/{}", chat_id),
            )
            .json(&json!({ "unread_count": unread_count }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}
