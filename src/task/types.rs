use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::judge::JudgeContext;

/// Kind of atomic interaction a task asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    #[default]
    Click,
    Type,
    Hover,
}

impl InteractionKind {
    /// Whether the interaction enters text and therefore needs `input_text`
    pub fn is_text_entry(&self) -> bool {
        matches!(self, InteractionKind::Type)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Click => "click",
            InteractionKind::Type => "type",
            InteractionKind::Hover => "hover",
        }
    }
}

/// How the target element is located on the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    Id,
    Class,
    Text,
    Xpath,
    Css,
}

/// Selector for the element the task targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSelector {
    #[serde(alias = "type")]
    pub kind: SelectorKind,
    pub value: String,
}

/// Reference outcome of a correct interaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundTruth {
    /// Screenshot of the page after a correct interaction
    #[serde(alias = "screenshot")]
    pub screenshot_path: PathBuf,

    #[serde(default)]
    pub description: String,

    /// Visual changes a correct interaction produces
    #[serde(default, alias = "visual_changes")]
    pub expected_visual_changes: Vec<String>,

    #[serde(default, alias = "success_criteria")]
    pub success_criteria: Vec<String>,
}

/// A single task, as loaded from the task file.
///
/// Field aliases accept the snake_case names used by existing datasets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    pub id: String,

    /// Natural-language instruction
    pub task: String,

    /// Page the task runs against
    #[serde(default, alias = "web", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, alias = "element_type")]
    pub element_type: String,

    #[serde(default, alias = "interaction")]
    pub interaction_kind: InteractionKind,

    #[serde(alias = "target_element")]
    pub target_selector: TargetSelector,

    /// Text to enter; present iff the interaction is `type`
    #[serde(default, alias = "input_text", skip_serializing_if = "Option::is_none")]
    pub input_text: Option<String>,

    /// Outer HTML of the correct target element
    #[serde(default, alias = "target_html")]
    pub expected_html: String,

    #[serde(alias = "ground_truth")]
    pub ground_truth: GroundTruth,
}

impl TaskDescriptor {
    /// Host the task runs against, without a leading `www.`.
    ///
    /// Falls back to the id prefix, so `amazon_search_1` gives `amazon`.
    pub fn site(&self) -> Option<String> {
        self.url
            .as_deref()
            .and_then(|url| reqwest::Url::parse(url).ok())
            .and_then(|url| url.host_str().map(|host| host.trim_start_matches("www.").to_string()))
            .or_else(|| self.id.split_once('_').map(|(prefix, _)| prefix.to_string()))
    }

    /// Check the descriptor's invariants.
    pub fn validate(&self) -> TaskResult<()> {
        if self.id.trim().is_empty() {
            return Err(TaskError::Invalid {
                task_id: self.id.clone(),
                reason: "empty task id".to_string(),
            });
        }

        let has_input = self.input_text.as_deref().is_some_and(|t| !t.is_empty());
        match (self.interaction_kind.is_text_entry(), has_input) {
            (true, false) => Err(TaskError::Invalid {
                task_id: self.id.clone(),
                reason: "type interaction without input text".to_string(),
            }),
            (false, true) => Err(TaskError::Invalid {
                task_id: self.id.clone(),
                reason: format!(
                    "input text given for a {} interaction",
                    self.interaction_kind.as_str()
                ),
            }),
            _ => Ok(()),
        }
    }

    /// Context passed to the visual judge
    pub fn judge_context(&self) -> JudgeContext {
        let mut interaction = self.interaction_kind.as_str().to_string();
        if let Some(text) = &self.input_text {
            interaction.push_str(&format!(" \"{}\"", text));
        }

        JudgeContext {
            instruction: self.task.clone(),
            interaction,
            ground_truth_description: self.ground_truth.description.clone(),
            expected_changes: self.ground_truth.expected_visual_changes.clone(),
            success_criteria: self.ground_truth.success_criteria.clone(),
        }
    }
}

/// Raw outcome of executing a task against a live page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRecord {
    #[serde(alias = "task_id")]
    pub task_id: String,

    /// Outer HTML of the element actually interacted with
    #[serde(default, alias = "html_element", skip_serializing_if = "Option::is_none")]
    pub actual_html: Option<String>,

    #[serde(default, alias = "before_screenshot", skip_serializing_if = "Option::is_none")]
    pub before_screenshot: Option<PathBuf>,

    #[serde(default, alias = "after_screenshot", skip_serializing_if = "Option::is_none")]
    pub after_screenshot: Option<PathBuf>,

    /// Why the interaction failed, if it did
    #[serde(default, alias = "error", skip_serializing_if = "Option::is_none")]
    pub error_info: Option<String>,
}

impl InteractionRecord {
    /// Record for a task whose execution failed.
    pub fn failed(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            error_info: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Result type for task loading
pub type TaskResult<T> = Result<T, TaskError>;

/// Errors from loading or validating tasks
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Invalid task {task_id}: {reason}")]
    Invalid { task_id: String, reason: String },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
