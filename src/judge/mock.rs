//! Scripted judge for tests and dry runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::error::{JudgeError, JudgeResult};
use super::response::parse_judgment;
use super::{Judge, JudgeRequest, VisualJudgment};

/// What the mock does for a task.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return this score with a canned rationale
    Score(f64),
    /// Parse this text as if an evaluator had returned it
    Raw(String),
    /// Fail with a transient network error on every call
    Unavailable,
    /// Fail transiently `failures` times, then return `score`
    Flaky { failures: u32, score: f64 },
    /// Never respond
    Hang,
}

/// Judge returning scripted results, keyed by task id.
#[derive(Debug)]
pub struct MockJudge {
    default: MockBehavior,
    overrides: HashMap<String, MockBehavior>,
    calls: Mutex<HashMap<String, u32>>,
}

impl MockJudge {
    pub fn new(default: MockBehavior) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// A judge that always returns `score`.
    pub fn with_score(score: f64) -> Self {
        Self::new(MockBehavior::Score(score))
    }

    /// Use `behavior` for one task.
    pub fn for_task(mut self, task_id: impl Into<String>, behavior: MockBehavior) -> Self {
        self.overrides.insert(task_id.into(), behavior);
        self
    }

    /// Number of calls made for a task.
    pub fn calls(&self, task_id: &str) -> u32 {
        self.calls
            .lock()
            .map(|calls| calls.get(task_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn record_call(&self, task_id: &str) -> u32 {
        let mut calls = match self.calls.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let count = calls.entry(task_id.to_string()).or_insert(0);
        *count += 1;
        *count
    }
}

#[async_trait]
impl Judge for MockJudge {
    fn name(&self) -> &str {
        "mock"
    }

    async fn judge(&self, request: &JudgeRequest) -> JudgeResult<VisualJudgment> {
        let call = self.record_call(&request.task_id);
        let behavior = self
            .overrides
            .get(&request.task_id)
            .unwrap_or(&self.default)
            .clone();

        match behavior {
            MockBehavior::Score(score) => Ok(scored(score)),
            MockBehavior::Raw(raw) => {
                let (score, rationale) = parse_judgment(&raw)?;
                Ok(VisualJudgment {
                    score,
                    rationale,
                    raw_response: raw,
                })
            }
            MockBehavior::Unavailable => {
                Err(JudgeError::Network("mock evaluator unavailable".to_string()))
            }
            MockBehavior::Flaky { failures, score } => {
                if call <= failures {
                    Err(JudgeError::Network(format!("mock failure {} of {}", call, failures)))
                } else {
                    Ok(scored(score))
                }
            }
            MockBehavior::Hang => std::future::pending().await,
        }
    }
}

fn scored(score: f64) -> VisualJudgment {
    let raw = format!("{{\"score\": {}, \"explanation\": \"mock judgment\"}}", score * 100.0);
    VisualJudgment {
        score,
        rationale: "mock judgment".to_string(),
        raw_response: raw,
    }
}
