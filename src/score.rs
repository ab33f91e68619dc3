//! Combining HTML and visual scores into a per-task verdict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_SUCCESS_THRESHOLD;
use crate::html::HtmlComparison;
use crate::judge::{JudgeError, VisualJudgment};
use crate::task::InteractionKind;

pub const VISUAL_WEIGHT: f64 = 0.6;
pub const HTML_WEIGHT: f64 = 0.4;

/// How the visual score was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualStatus {
    /// The evaluator returned a score
    Judged,
    /// The evaluator could not be reached or kept failing
    EvaluatorUnavailable,
    /// The evaluator answered without a usable score
    MalformedResponse,
    /// Screenshots could not be loaded
    MissingImages,
    /// Not attempted because the interaction itself failed
    Skipped,
}

impl VisualStatus {
    fn from_error(error: &JudgeError) -> Self {
        match error {
            JudgeError::MalformedResponse(_) => VisualStatus::MalformedResponse,
            JudgeError::Image { .. } => VisualStatus::MissingImages,
            _ => VisualStatus::EvaluatorUnavailable,
        }
    }
}

/// Why a task did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FailureCategory {
    /// The executor could not find the target element
    ElementNotFound,
    /// The interaction or the evaluation ran out of time
    Timeout,
    /// The task descriptor failed validation
    InvalidTask,
    /// Any other executor failure
    ExecutionError,
    EvaluatorUnavailable,
    MalformedResponse,
    MissingImages,
    /// Judged, but the final score fell short of the threshold
    BelowThreshold,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::ElementNotFound => "element_not_found",
            FailureCategory::Timeout => "timeout",
            FailureCategory::InvalidTask => "invalid_task",
            FailureCategory::ExecutionError => "execution_error",
            FailureCategory::EvaluatorUnavailable => "evaluator_unavailable",
            FailureCategory::MalformedResponse => "malformed_response",
            FailureCategory::MissingImages => "missing_images",
            FailureCategory::BelowThreshold => "below_threshold",
        }
    }

    fn from_execution_error(error: &str) -> Self {
        let error = error.to_lowercase();
        if error.contains("timed out") || error.contains("timeout") {
            FailureCategory::Timeout
        } else if error.contains("not found") {
            FailureCategory::ElementNotFound
        } else if error.starts_with("invalid task") {
            FailureCategory::InvalidTask
        } else {
            FailureCategory::ExecutionError
        }
    }
}

/// Final scored outcome for one task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRecord {
    pub task_id: String,

    /// Interaction the task asked for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_kind: Option<InteractionKind>,

    /// Site the task ran against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    /// Visual score in [0, 1]; 0 when no judgment was obtained
    pub visual_score: f64,
    pub visual_rationale: String,
    pub visual_status: VisualStatus,

    /// Evaluator failure, distinct from a genuine low score
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_error: Option<String>,

    pub html_score: HtmlComparison,
    pub final_score: f64,
    pub success: bool,

    /// Threshold `final_score` was held against
    pub threshold: f64,

    /// Execution failure reported by the task executor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<String>,

    /// Unmodified evaluator output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl EvaluationRecord {
    /// Attach the task's interaction kind and site for per-group reporting
    pub fn labelled(mut self, kind: InteractionKind, site: Option<String>) -> Self {
        self.interaction_kind = Some(kind);
        self.site = site;
        self
    }

    /// Failure category, `None` for a successful task
    pub fn failure_category(&self) -> Option<FailureCategory> {
        if self.success {
            return None;
        }
        if let Some(error) = &self.execution_error {
            return Some(FailureCategory::from_execution_error(error));
        }
        Some(match self.visual_status {
            VisualStatus::Judged => FailureCategory::BelowThreshold,
            VisualStatus::EvaluatorUnavailable => FailureCategory::EvaluatorUnavailable,
            VisualStatus::MalformedResponse => FailureCategory::MalformedResponse,
            VisualStatus::MissingImages => FailureCategory::MissingImages,
            VisualStatus::Skipped => FailureCategory::ExecutionError,
        })
    }
}

/// `0.6 * visual + 0.4 * html`, clamped to [0, 1]. Non-finite input scores 0.
pub fn final_score(visual: f64, html: f64) -> f64 {
    let score = VISUAL_WEIGHT * visual + HTML_WEIGHT * html;
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Applies the weighting and threshold policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregator {
    threshold: f64,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(DEFAULT_SUCCESS_THRESHOLD)
    }
}

impl Aggregator {
    pub fn new(threshold: f64) -> Self {
        let threshold = if threshold.is_finite() {
            threshold.clamp(0.0, 1.0)
        } else {
            DEFAULT_SUCCESS_THRESHOLD
        };
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Combine an HTML comparison with the judge's outcome.
    ///
    /// A failed judgment yields `visual_score = 0` and `success = false`.
    pub fn combine(
        &self,
        task_id: &str,
        html: HtmlComparison,
        visual: &Result<VisualJudgment, JudgeError>,
        timestamp: DateTime<Utc>,
    ) -> EvaluationRecord {
        match visual {
            Ok(judgment) => {
                let visual_score = judgment.score.clamp(0.0, 1.0);
                let final_score = final_score(visual_score, html.total_score);
                EvaluationRecord {
                    task_id: task_id.to_string(),
                    interaction_kind: None,
                    site: None,
                    visual_score,
                    visual_rationale: judgment.rationale.clone(),
                    visual_status: VisualStatus::Judged,
                    visual_error: None,
                    html_score: html,
                    final_score,
                    success: final_score >= self.threshold,
                    threshold: self.threshold,
                    execution_error: None,
                    raw_response: Some(judgment.raw_response.clone()),
                    timestamp,
                }
            }
            Err(error) => EvaluationRecord {
                task_id: task_id.to_string(),
                interaction_kind: None,
                site: None,
                visual_score: 0.0,
                visual_rationale: String::new(),
                visual_status: VisualStatus::from_error(error),
                visual_error: Some(error.to_string()),
                html_score: html,
                final_score: final_score(0.0, html.total_score),
                success: false,
                threshold: self.threshold,
                execution_error: None,
                raw_response: None,
                timestamp,
            },
        }
    }

    /// Record for a task whose execution failed; nothing is scored.
    pub fn execution_failure(
        &self,
        task_id: &str,
        error: &str,
        timestamp: DateTime<Utc>,
    ) -> EvaluationRecord {
        EvaluationRecord {
            task_id: task_id.to_string(),
            interaction_kind: None,
            site: None,
            visual_score: 0.0,
            visual_rationale: String::new(),
            visual_status: VisualStatus::Skipped,
            visual_error: None,
            html_score: HtmlComparison::zero(),
            final_score: 0.0,
            success: false,
            threshold: self.threshold,
            execution_error: Some(error.to_string()),
            raw_response: None,
            timestamp,
        }
    }
}
