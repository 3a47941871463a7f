//! Persistence of assistant answers
//!
//! Callers save the text of a turn under its pair id once the stream has
//! ended, including when it was cancelled part way through.

use reqwest::StatusCode;
use serde::Serialize;

use crate::error::{DittoError, Result};

use super::ApiContext;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveResponseRequest<'a> {
    #[serde(rename = "userID")]
    user_id: &'a str,
    #[serde(rename = "pairID")]
    pair_id: &'a str,
    response: &'a str,
}

/// Store `text` as the answer of `pair_id`
///
/// # Errors
///
/// Returns an error if no token is available, the request fails, or the
/// backend answers with anything but `201 Created`.
pub async fn save_response(api: &ApiContext, pair_id: &str, text: &str) -> Result<()> {
    if pair_id.is_empty() {
        return Err(DittoError::Validation("pairID is required".to_string()));
    }

    let token = api.token().await?;
    let body = SaveResponseRequest {
        user_id: &token.user_id,
        pair_id,
        response: text,
    };

    let response = api
        .client()
        .post(api.endpoint(&["v1", "save-response"])?)
        .bearer_auth(&token.token)
        .json(&body)
        .send()
        .await?;

    match response.status() {
        StatusCode::CREATED => {
            tracing::debug!(pair_id, chars = text.len(), "response saved");
            Ok(())
        }
        status => Err(DittoError::Network(format!(
            "Unable to save response. Error: {}",
            status.as_u16()
        ))),
    }
}
