//! Shared HTTP plumbing for evaluator API clients.

use std::time::Duration;

use tracing::debug;

use super::error::{JudgeError, JudgeResult};
use crate::config::JudgeSettings;

pub(crate) fn build_client(settings: &JudgeSettings) -> JudgeResult<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(settings.connect_timeout))
        .timeout(Duration::from_secs(settings.request_timeout))
        .build()
        .map_err(JudgeError::from)
}

/// Send a prepared request and decode a JSON body, mapping failures onto
/// [`JudgeError`] so the retry layer can classify them.
pub(crate) async fn send_json(
    request: reqwest::RequestBuilder,
    timeout_secs: u64,
) -> JudgeResult<serde_json::Value> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            JudgeError::Timeout(timeout_secs)
        } else {
            JudgeError::Network(e.to_string())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        let body = response.text().await.unwrap_or_default();
        // Both OpenAI and Anthropic wrap errors as {"error": {"message": "..."}}
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(String::from))
            .unwrap_or(body);
        return Err(JudgeError::from_status(status.as_u16(), message, retry_after));
    }

    let body = response.text().await.map_err(|e| {
        if e.is_timeout() {
            JudgeError::Timeout(timeout_secs)
        } else {
            JudgeError::Network(e.to_string())
        }
    })?;
    debug!(bytes = body.len(), "evaluator response received");

    serde_json::from_str(&body).map_err(|e| JudgeError::MalformedResponse(e.to_string()))
}
