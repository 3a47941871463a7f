//! Chat session and conversation history API

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

use super::{check_status, ApiContext};

/// A server-side chat session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: String,
    #[serde(rename = "userID", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub title: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total_count: u64,
    pub total_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    pub items: Vec<ChatSession>,
    pub pagination: Pagination,
}

/// Fields of a session that can be changed; absent fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateSessionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// Content item of a stored prompt or answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredContent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "imageURL", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(rename = "toolCallID", default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<Map<String, Value>>,
    #[serde(rename = "toolResultID", default, skip_serializing_if = "Option::is_none")]
    pub tool_result_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_output: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// One prompt/answer pair from the history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "sessionID", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub input: Vec<StoredContent>,
    #[serde(default)]
    pub output: Vec<StoredContent>,
}

impl Memory {
    /// Text of the answer, joined across text items
    #[must_use]
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationsResponse {
    pub conversations: Vec<Memory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Query for [`SessionsClient::list_sessions`]
#[derive(Debug, Clone, Default)]
pub struct ListSessionsQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// Client for `/api/v3/users/{userID}/sessions` and `/conversations`
#[derive(Debug, Clone)]
pub struct SessionsClient {
    api: ApiContext,
}

impl SessionsClient {
    #[must_use]
    pub fn new(api: ApiContext) -> Self {
        Self { api }
    }

    /// List the user's sessions
    ///
    /// # Errors
    ///
    /// Returns an error on auth failure, a non-2xx status or an unexpected body
    pub async fn list_sessions(&self, query: &ListSessionsQuery) -> Result<ListSessionsResponse> {
        let token = self.api.token().await?;
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(status) = &query.status {
            params.push(("status", status.clone()));
        }
        if let Some(page) = query.page {
            params.push(("page", page.to_string()));
        }
        if let Some(page_size) = query.page_size {
            params.push(("pageSize", page_size.to_string()));
        }

        let response = self
            .api
            .client()
            .get(self.user_url(&token.user_id, &["sessions"])?)
            .bearer_auth(&token.token)
            .query(&params)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// Fetch one session
    ///
    /// # Errors
    ///
    /// Returns an error on auth failure, a non-2xx status or an unexpected body
    pub async fn get_session(&self, session_id: &str) -> Result<ChatSession> {
        let token = self.api.token().await?;
        let response = self
            .api
            .client()
            .get(self.user_url(&token.user_id, &["sessions", session_id])?)
            .bearer_auth(&token.token)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// Change title, status or metadata of a session
    ///
    /// # Errors
    ///
    /// Returns an error on auth failure, a non-2xx status or an unexpected body
    pub async fn update_session(
        &self,
        session_id: &str,
        update: &UpdateSessionRequest,
    ) -> Result<ChatSession> {
        let token = self.api.token().await?;
        let response = self
            .api
            .client()
            .patch(self.user_url(&token.user_id, &["sessions", session_id])?)
            .bearer_auth(&token.token)
            .json(update)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    /// Delete a session
    ///
    /// # Errors
    ///
    /// Returns an error on auth failure or a non-2xx status
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let token = self.api.token().await?;
        let response = self
            .api
            .client()
            .delete(self.user_url(&token.user_id, &["sessions", session_id])?)
            .bearer_auth(&token.token)
            .send()
            .await?;

        check_status(response).await?;
        Ok(())
    }

    /// Page through past prompt/answer pairs, newest first
    ///
    /// # Errors
    ///
    /// Returns an error on auth failure, a non-2xx status or an unexpected body
    pub async fn conversations(
        &self,
        limit: Option<u32>,
        cursor: Option<&str>,
    ) -> Result<ConversationsResponse> {
        let token = self.api.token().await?;
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(limit) = limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }

        let response = self
            .api
            .client()
            .get(self.user_url(&token.user_id, &["conversations"])?)
            .bearer_auth(&token.token)
            .query(&params)
            .send()
            .await?;

        Ok(check_status(response).await?.json().await?)
    }

    fn user_url(&self, user_id: &str, rest: &[&str]) -> Result<Url> {
        let mut segments = vec!["api", "v3", "users", user_id];
        segments.extend_from_slice(rest);
        self.api.endpoint(&segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_request_skips_absent_fields() {
        let update = UpdateSessionRequest {
            title: Some("Trip plans".to_string()),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({"title": "Trip plans"}));
    }

    #[test]
    fn test_memory_output_text() {
        let memory: Memory = serde_json::from_value(json!({
            "id": "m1",
            "timestamp": "2024-05-01T12:00:00Z",
            "output": [
                {"type": "text", "text": "Hello "},
                {"type": "image", "imageURL": "https://img"},
                {"type": "text", "text": "there"}
            ]
        }))
        .unwrap();
        assert_eq!(memory.output_text(), "Hello there");
        assert!(memory.input.is_empty());
    }
}
