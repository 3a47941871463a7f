//! Service layer for the Ditto backend
//!
//! This module provides:
//! - [`AuthProvider`]: source of the bearer token, asked once per request
//! - [`ApiContext`]: shared HTTP client, base URL and auth
//! - [`chat::ChatClient`]: the streaming chat endpoint
//! - [`sessions::SessionsClient`]: session and conversation history REST calls
//! - [`responses::save_response`]: persistence of a finished or partial answer

pub mod chat;
pub mod responses;
pub mod sessions;
pub mod streaming;

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Url};

use crate::{
    config::Config,
    error::{DittoError, Result},
};

/// Bearer token together with the user it was issued for
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    pub token: String,
    pub user_id: String,
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Source of credentials for backend calls
///
/// Implementations may refresh the token on every call; callers never cache it.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn get_token(&self) -> Result<AuthToken>;
}

/// Fixed token taken from configuration
#[derive(Debug, Clone)]
pub struct StaticTokenAuth {
    token: AuthToken,
}

impl StaticTokenAuth {
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: AuthToken {
                token: token.into(),
                user_id: user_id.into(),
            },
        }
    }
}

#[async_trait]
impl AuthProvider for StaticTokenAuth {
    async fn get_token(&self) -> Result<AuthToken> {
        if self.token.token.is_empty() {
            return Err(DittoError::Auth("User not authenticated".to_string()));
        }
        if self.token.user_id.is_empty() {
            return Err(DittoError::Auth("No user id configured".to_string()));
        }
        Ok(self.token.clone())
    }
}

/// HTTP plumbing shared by every backend client
#[derive(Clone)]
pub struct ApiContext {
    client: Client,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
}

impl ApiContext {
    /// Create a context for `base_url`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>, auth: Arc<dyn AuthProvider>) -> Result<Self> {
        Self::with_connect_timeout(base_url, auth, None)
    }

    /// Create a context whose connection attempts give up after `timeout`
    ///
    /// Only the connection is bounded; a response may stream for as long as
    /// the server keeps it open.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn with_connect_timeout(
        base_url: impl Into<String>,
        auth: Arc<dyn AuthProvider>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let base_url = base_url.into();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(DittoError::InvalidConfig(format!(
                "base URL must be http(s): {base_url}"
            )));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.connect_timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// Build a context from loaded configuration using its static token
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is unusable
    pub fn from_config(config: &Config) -> Result<Self> {
        let auth = StaticTokenAuth::new(
            config.settings.token.clone().unwrap_or_default(),
            config.settings.user_id.clone().unwrap_or_default(),
        );
        Self::with_connect_timeout(
            config.settings.base_url.clone(),
            Arc::new(auth),
            config.settings.request_timeout_secs.map(Duration::from_secs),
        )
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    /// URL of `segments` below the base URL, each segment escaped
    pub(crate) fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| DittoError::InvalidConfig(format!("bad base URL {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|()| DittoError::InvalidConfig(format!("base URL cannot have a path: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub(crate) async fn token(&self) -> Result<AuthToken> {
        self.auth.get_token().await
    }
}

impl fmt::Debug for ApiContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiContext")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Fail with the matching error for a non-2xx response
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), %body, "backend rejected request");
    Err(DittoError::status(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token_auth() {
        let auth = StaticTokenAuth::new("tok", "user-1");
        let token = auth.get_token().await.unwrap();
        assert_eq!(token.user_id, "user-1");
        assert_eq!(token.token, "tok");
    }

    #[tokio::test]
    async fn test_static_token_auth_requires_token() {
        let auth = StaticTokenAuth::new("", "user-1");
        assert!(matches!(auth.get_token().await, Err(DittoError::Auth(_))));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = AuthToken {
            token: "secret".to_string(),
            user_id: "u".to_string(),
        };
        assert!(!format!("{token:?}").contains("secret"));
    }

    #[test]
    fn test_context_normalizes_base_url() {
        let ctx = ApiContext::new("https://api.example.com/", Arc::new(StaticTokenAuth::new("t", "u")))
            .unwrap();
        assert_eq!(
            ctx.endpoint(&["v1", "x"]).unwrap().as_str(),
            "https://api.example.com/v1/x"
        );
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let ctx = ApiContext::new("http://localhost:8080/prefix", Arc::new(StaticTokenAuth::new("t", "u")))
            .unwrap();
        let url = ctx
            .endpoint(&["api", "v3", "users", "a/b?c", "sessions", "s 1"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/prefix/api/v3/users/a%2Fb%3Fc/sessions/s%201"
        );
    }

    #[test]
    fn test_context_rejects_non_http_url() {
        let result = ApiContext::new("ftp://nope", Arc::new(StaticTokenAuth::new("t", "u")));
        assert!(matches!(result, Err(DittoError::InvalidConfig(_))));
    }
}
