//! Request types for a chat turn
//!
//! A turn is an ordered list of content blocks (text plus image/file
//! references) sent to the chat endpoint together with the device identity,
//! the user's local time and an optional session to continue.

use serde::{Deserialize, Serialize};

use crate::error::{DittoError, Result};

/// Kind of a content block, serialized with the backend's wire names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentKind {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "image")]
    Image,
    #[serde(rename = "application/pdf")]
    Pdf,
    #[serde(rename = "audio/mp3")]
    Audio,
}

impl ContentKind {
    /// Whether blocks of this kind reference an uploaded file
    #[must_use]
    pub fn is_attachment(self) -> bool {
        !matches!(self, ContentKind::Text)
    }
}

/// One block of user input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: ContentKind,

    /// Text for `text` blocks, download URL for attachments
    pub content: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
}

impl ContentBlock {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Text,
            content: content.into(),
            original_filename: None,
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Image,
            content: url.into(),
            original_filename: None,
        }
    }

    /// An uploaded file (pdf, audio) with the name the user picked it under
    pub fn file(kind: ContentKind, url: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            kind,
            content: url.into(),
            original_filename: Some(filename.into()),
        }
    }
}

/// Body of `POST /api/v3/users/{userID}/chat`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(rename = "deviceID")]
    pub device_id: String,

    pub input: Vec<ContentBlock>,

    #[serde(default)]
    pub deep_search_memories: bool,

    pub user_local_time: String,

    #[serde(rename = "sessionID", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ChatRequest {
    /// Start a request for `device_id`, stamped with the current local time
    pub fn new(device_id: impl Into<String>, input: Vec<ContentBlock>) -> Self {
        Self {
            device_id: device_id.into(),
            input,
            deep_search_memories: false,
            user_local_time: local_time_string(),
            session_id: None,
        }
    }

    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    #[must_use]
    pub fn with_deep_search(mut self, enabled: bool) -> Self {
        self.deep_search_memories = enabled;
        self
    }

    /// Check the request before it is sent
    ///
    /// # Errors
    ///
    /// Returns [`DittoError::Validation`] when a required field is missing or
    /// the input blocks cannot form a turn.
    pub fn validate(&self) -> Result<()> {
        if self.device_id.trim().is_empty() {
            return Err(DittoError::Validation("deviceID is required".to_string()));
        }
        if self.user_local_time.trim().is_empty() {
            return Err(DittoError::Validation(
                "userLocalTime is required".to_string(),
            ));
        }
        if self.input.is_empty() {
            return Err(DittoError::Validation(
                "input must contain at least one content block".to_string(),
            ));
        }
        if let Some(session_id) = &self.session_id {
            if session_id.trim().is_empty() {
                return Err(DittoError::Validation(
                    "sessionID must not be empty when present".to_string(),
                ));
            }
        }

        let has_attachment = self.input.iter().any(|b| b.kind.is_attachment());
        for (index, block) in self.input.iter().enumerate() {
            match block.kind {
                ContentKind::Text if block.content.is_empty() && !has_attachment => {
                    return Err(DittoError::Validation(format!(
                        "input[{index}]: empty text requires an attachment in the same turn"
                    )));
                }
                kind if kind.is_attachment() && block.content.trim().is_empty() => {
                    return Err(DittoError::Validation(format!(
                        "input[{index}]: attachment is missing its URL"
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Local wall-clock time in the format the backend expects for `userLocalTime`
#[must_use]
pub fn local_time_string() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S %:z")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_wire_names() {
        let request = ChatRequest {
            device_id: "dev-1".to_string(),
            input: vec![
                ContentBlock::text("hi"),
                ContentBlock::file(ContentKind::Pdf, "https://x/y.pdf", "y.pdf"),
            ],
            deep_search_memories: true,
            user_local_time: "2024-01-01 10:00:00 +00:00".to_string(),
            session_id: Some("s-1".to_string()),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "deviceID": "dev-1",
                "input": [
                    {"type": "text", "content": "hi"},
                    {"type": "application/pdf", "content": "https://x/y.pdf", "originalFilename": "y.pdf"}
                ],
                "deepSearchMemories": true,
                "userLocalTime": "2024-01-01 10:00:00 +00:00",
                "sessionID": "s-1"
            })
        );
    }

    #[test]
    fn test_session_id_omitted_when_absent() {
        let request = ChatRequest::new("dev", vec![ContentBlock::text("hi")]);
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("sessionID").is_none());
    }

    #[test]
    fn test_validate_accepts_plain_text() {
        let request = ChatRequest::new("dev", vec![ContentBlock::text("hello")]);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_input() {
        let request = ChatRequest::new("dev", Vec::new());
        assert!(matches!(
            request.validate(),
            Err(DittoError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_missing_device() {
        let request = ChatRequest::new(" ", vec![ContentBlock::text("hello")]);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_empty_text_allowed_with_attachment() {
        let request = ChatRequest::new(
            "dev",
            vec![ContentBlock::text(""), ContentBlock::image("https://img")],
        );
        assert!(request.validate().is_ok());

        let text_only = ChatRequest::new("dev", vec![ContentBlock::text("")]);
        assert!(text_only.validate().is_err());
    }

    #[test]
    fn test_attachment_requires_url() {
        let request = ChatRequest::new("dev", vec![ContentBlock::image("")]);
        assert!(request.validate().is_err());
    }
}
