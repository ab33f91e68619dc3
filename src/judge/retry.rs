//! Bounded retry with exponential backoff around any [`Judge`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::error::{JudgeError, JudgeResult};
use super::{Judge, JudgeRequest, VisualJudgment};
use crate::config::JudgeSettings;

/// Backoff policy for transient evaluator failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further retry
    pub base_delay: Duration,
    /// Cap on the computed exponential delay
    pub max_delay: Duration,
    /// Minimum wait after a rate-limit response
    pub rate_limit_floor: Duration,
    /// Minimum wait after a 5xx response
    pub server_error_floor: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            rate_limit_floor: Duration::from_secs(10),
            server_error_floor: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &JudgeSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.retry_base_ms),
            ..Self::default()
        }
    }

    /// No waiting between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            rate_limit_floor: Duration::ZERO,
            server_error_floor: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based) after `error`.
    pub fn delay_for(&self, attempt: u32, error: &JudgeError) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);

        let floor = match error {
            JudgeError::RateLimited {
                retry_after_seconds: Some(secs),
            } => Duration::from_secs(*secs).max(self.rate_limit_floor),
            JudgeError::RateLimited { .. } => self.rate_limit_floor,
            JudgeError::Api { status, .. } if *status >= 500 => self.server_error_floor,
            _ => Duration::ZERO,
        };

        exponential.max(floor)
    }
}

/// Wraps a judge, retrying transient failures.
pub struct RetryingJudge<J> {
    inner: J,
    policy: RetryPolicy,
}

impl<J: Judge> RetryingJudge<J> {
    pub fn new(inner: J, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &J {
        &self.inner
    }
}

#[async_trait]
impl<J: Judge> Judge for RetryingJudge<J> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn judge(&self, request: &JudgeRequest) -> JudgeResult<VisualJudgment> {
        let mut attempt = 0;
        loop {
            match self.inner.judge(request).await {
                Ok(judgment) => return Ok(judgment),
                Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
                    let delay = self.policy.delay_for(attempt, &e);
                    warn!(
                        task_id = %request.task_id,
                        judge = self.inner.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "evaluator call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(JudgeError::Exhausted {
                        attempts: attempt + 1,
                        last: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}
