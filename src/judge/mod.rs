//! Visual similarity judge.
//!
//! Asks a vision-capable evaluator how closely the after screenshot matches
//! the ground truth, given the before state and the task context:
//! - One [`Judge`] implementation per provider, plus offline and mock judges
//! - Defensive score extraction from free-form responses
//! - Bounded retries with backoff for transient failures
//!
//! # Configuration
//!
//! Provider, endpoint, model and retry settings come from
//! [`crate::config::JudgeSettings`]; see the `config` module for the
//! environment variables.

mod anthropic;
mod error;
mod http;
pub mod image;
mod mock;
mod openai;
mod pixel;
mod prompt;
pub mod response;
mod retry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use anthropic::AnthropicJudge;
pub use error::{JudgeError, JudgeResult};
pub use mock::{MockBehavior, MockJudge};
pub use openai::OpenAiJudge;
pub use pixel::PixelJudge;
pub use prompt::{SYSTEM_PROMPT, build_user_prompt};
pub use retry::{RetryPolicy, RetryingJudge};

use crate::config::{JudgeSettings, Provider};

/// Task context handed to the evaluator alongside the screenshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeContext {
    /// Natural-language instruction
    pub instruction: String,
    /// Interaction kind, e.g. "click"
    pub interaction: String,
    /// Ground truth description of the expected outcome
    pub ground_truth_description: String,
    pub expected_changes: Vec<String>,
    pub success_criteria: Vec<String>,
}

/// One visual judgment request.
#[derive(Debug, Clone)]
pub struct JudgeRequest {
    pub task_id: String,
    pub before: PathBuf,
    pub after: PathBuf,
    pub ground_truth: PathBuf,
    pub context: JudgeContext,
}

/// Evaluator verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualJudgment {
    /// Score in [0, 1]
    pub score: f64,
    /// Free-text explanation
    pub rationale: String,
    /// Unmodified evaluator output
    pub raw_response: String,
}

/// Capability to score a screenshot triple given task context.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Short provider name for logs and records.
    fn name(&self) -> &str;

    async fn judge(&self, request: &JudgeRequest) -> JudgeResult<VisualJudgment>;
}

#[async_trait]
impl<J: Judge + ?Sized> Judge for Arc<J> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn judge(&self, request: &JudgeRequest) -> JudgeResult<VisualJudgment> {
        (**self).judge(request).await
    }
}

/// Build the configured judge. Network judges are wrapped in [`RetryingJudge`].
pub fn build_judge(settings: &JudgeSettings) -> JudgeResult<Arc<dyn Judge>> {
    let policy = RetryPolicy::from_settings(settings);
    let judge: Arc<dyn Judge> = match settings.provider {
        Provider::OpenAi => Arc::new(RetryingJudge::new(OpenAiJudge::new(settings)?, policy)),
        Provider::Anthropic => {
            Arc::new(RetryingJudge::new(AnthropicJudge::new(settings)?, policy))
        }
        Provider::Pixel => Arc::new(PixelJudge),
    };
    Ok(judge)
}

/// Check if an evaluator endpoint is reachable.
///
/// Sends a HEAD request to the endpoint's origin. Any HTTP response, even
/// 4xx/5xx, means the server is up; only connection failures count as down.
pub async fn check_health(endpoint: &str, timeout_secs: u64) -> JudgeResult<bool> {
    let url = reqwest::Url::parse(endpoint)
        .map_err(|e| JudgeError::Network(format!("invalid endpoint '{}': {}", endpoint, e)))?;
    let origin = url.origin().ascii_serialization();

    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(timeout_secs))
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;

    Ok(client.head(&origin).send().await.is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_pixel_judge() {
        let settings = JudgeSettings::defaults().with_provider(Provider::Pixel);
        let judge = build_judge(&settings).unwrap();
        assert_eq!(judge.name(), "pixel");
    }

    #[test]
    fn test_build_openai_judge_without_key() {
        let mut settings = JudgeSettings::defaults();
        settings.endpoint = "http://127.0.0.1:8080/v1/chat/completions".to_string();
        let judge = build_judge(&settings).unwrap();
        assert_eq!(judge.name(), "openai");
    }

    #[test]
    fn test_build_anthropic_requires_key() {
        let mut settings = JudgeSettings::defaults().with_provider(Provider::Anthropic);
        settings.api_key = None;
        assert!(matches!(build_judge(&settings), Err(JudgeError::Authentication(_))));
    }

    #[tokio::test]
    async fn test_check_health_invalid_endpoint() {
        assert!(check_health("not a url", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_check_health_unreachable() {
        // Port 9 (discard) is closed on test machines
        let healthy = check_health("http://127.0.0.1:9/v1/chat/completions", 1)
            .await
            .unwrap();
        assert!(!healthy);
    }
}
