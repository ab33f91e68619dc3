//! Per-task evaluation and batch execution.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::{Config, DEFAULT_JUDGE_CONCURRENCY, DEFAULT_TASK_TIMEOUT};
use crate::html::HtmlScorer;
use crate::judge::{Judge, JudgeError, JudgeRequest};
use crate::score::{Aggregator, EvaluationRecord};
use crate::store::{EvaluationStore, EvaluationSummary, StoreResult};
use crate::task::{InteractionRecord, TaskDescriptor};

/// How a batch is scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One task at a time, in input order
    Sequential,
    /// Up to `workers` tasks in flight
    Parallel { workers: usize },
}

impl ExecutionMode {
    pub fn parallel(workers: usize) -> Self {
        ExecutionMode::Parallel {
            workers: workers.max(1),
        }
    }
}

/// Scores one task at a time: HTML comparison, visual judgment, aggregation.
pub struct Evaluator {
    judge: Arc<dyn Judge>,
    scorer: HtmlScorer,
    aggregator: Aggregator,
    judge_permits: Semaphore,
    task_timeout: Duration,
    clock: fn() -> DateTime<Utc>,
}

impl Evaluator {
    pub fn new(judge: Arc<dyn Judge>) -> Self {
        Self {
            judge,
            scorer: HtmlScorer::default(),
            aggregator: Aggregator::default(),
            judge_permits: Semaphore::new(DEFAULT_JUDGE_CONCURRENCY),
            task_timeout: Duration::from_secs(DEFAULT_TASK_TIMEOUT),
            clock: Utc::now,
        }
    }

    /// Evaluator using the scoring, concurrency and timeout settings in `config`
    pub fn from_config(judge: Arc<dyn Judge>, config: &Config) -> Self {
        Self::new(judge)
            .with_scorer(HtmlScorer::new().dynamic_attributes(&config.scoring.dynamic_attributes))
            .with_threshold(config.scoring.success_threshold)
            .with_judge_concurrency(config.judge.concurrency)
            .with_task_timeout(Duration::from_secs(config.batch.task_timeout))
    }

    pub fn with_scorer(mut self, scorer: HtmlScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.aggregator = Aggregator::new(threshold);
        self
    }

    /// Cap concurrent judge calls, independent of the worker count
    pub fn with_judge_concurrency(mut self, permits: usize) -> Self {
        self.judge_permits = Semaphore::new(permits.max(1));
        self
    }

    /// Bound each judge call. Time spent waiting for a judge permit is not counted.
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Timestamp source for records
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn judge_name(&self) -> &str {
        self.judge.name()
    }

    pub fn threshold(&self) -> f64 {
        self.aggregator.threshold()
    }

    /// Degraded record for a task that could not be evaluated
    pub fn failure_record(&self, task_id: &str, error: &str) -> EvaluationRecord {
        self.aggregator
            .execution_failure(task_id, error, (self.clock)())
    }

    /// Evaluate one task against its interaction record.
    ///
    /// Never fails: every problem ends up in the returned record.
    pub async fn evaluate(
        &self,
        task: &TaskDescriptor,
        interaction: &InteractionRecord,
    ) -> EvaluationRecord {
        self.score_task(task, interaction)
            .await
            .labelled(task.interaction_kind, task.site())
    }

    async fn score_task(
        &self,
        task: &TaskDescriptor,
        interaction: &InteractionRecord,
    ) -> EvaluationRecord {
        if interaction.task_id != task.id {
            error!(
                task_id = %task.id,
                record_task_id = %interaction.task_id,
                "interaction record belongs to another task"
            );
            return self.failure_record(
                &task.id,
                &format!("interaction record belongs to task {}", interaction.task_id),
            );
        }

        if let Err(e) = task.validate() {
            warn!(task_id = %task.id, error = %e, "invalid task descriptor");
            return self.failure_record(&task.id, &e.to_string());
        }

        if let Some(reason) = &interaction.error_info {
            info!(task_id = %task.id, error = %reason, "interaction failed, skipping scoring");
            return self.failure_record(&task.id, reason);
        }

        if interaction.actual_html.is_none()
            && interaction.before_screenshot.is_none()
            && interaction.after_screenshot.is_none()
        {
            error!(task_id = %task.id, "interaction record has neither html nor screenshots");
            return self.failure_record(&task.id, "interaction record has no html or screenshots");
        }

        let html = self
            .scorer
            .compare(interaction.actual_html.as_deref(), &task.expected_html);
        debug!(task_id = %task.id, html_total = html.total_score, "html compared");

        let visual = match (&interaction.before_screenshot, &interaction.after_screenshot) {
            (Some(before), Some(after)) => {
                let request = JudgeRequest {
                    task_id: task.id.clone(),
                    before: before.clone(),
                    after: after.clone(),
                    ground_truth: task.ground_truth.screenshot_path.clone(),
                    context: task.judge_context(),
                };
                let judged = match self.judge_permits.acquire().await {
                    Ok(_permit) => {
                        tokio::time::timeout(self.task_timeout, self.judge.judge(&request)).await
                    }
                    Err(_) => Ok(Err(JudgeError::Network("judge pool closed".to_string()))),
                };
                match judged {
                    Ok(result) => result,
                    Err(_) => {
                        let secs = self.task_timeout.as_secs_f64();
                        warn!(task_id = %task.id, timeout_secs = secs, "task timed out");
                        return self.failure_record(
                            &task.id,
                            &format!("evaluation timed out after {:.1}s", secs),
                        );
                    }
                }
            }
            (None, _) => Err(JudgeError::image("before", "no before screenshot recorded")),
            (_, None) => Err(JudgeError::image("after", "no after screenshot recorded")),
        };

        if let Err(e) = &visual {
            warn!(task_id = %task.id, error = %e, "visual judgment failed");
        }

        let record = self.aggregator.combine(&task.id, html, &visual, (self.clock)());
        info!(
            task_id = %record.task_id,
            final_score = record.final_score,
            success = record.success,
            "task evaluated"
        );
        record
    }
}

/// Evaluate one task on its own tokio task, isolating panics.
async fn evaluate_guarded(
    evaluator: Arc<Evaluator>,
    task: TaskDescriptor,
    interaction: InteractionRecord,
) -> EvaluationRecord {
    let task_id = task.id.clone();
    let (kind, site) = (task.interaction_kind, task.site());
    let worker = Arc::clone(&evaluator);
    let span = info_span!("task", task_id = %task_id);

    let handle =
        tokio::spawn(async move { worker.evaluate(&task, &interaction).await }.instrument(span));

    match handle.await {
        Ok(record) => record,
        Err(e) => {
            error!(task_id = %task_id, error = %e, "evaluation task aborted");
            evaluator
                .failure_record(&task_id, &format!("evaluation aborted: {}", e))
                .labelled(kind, site)
        }
    }
}

/// Evaluate every pair, writing records through `store` as they complete.
///
/// Always produces one record per pair. Returns the summary sorted by task id,
/// also written to `summary_path` when given.
pub async fn run_batch(
    evaluator: Arc<Evaluator>,
    pairs: Vec<(TaskDescriptor, InteractionRecord)>,
    mode: ExecutionMode,
    store: &EvaluationStore,
    summary_path: Option<&Path>,
) -> StoreResult<EvaluationSummary> {
    let total = pairs.len();
    info!(total, judge = evaluator.judge_name(), ?mode, "starting batch");

    match mode {
        ExecutionMode::Sequential => {
            for (task, interaction) in pairs {
                let record = evaluate_guarded(Arc::clone(&evaluator), task, interaction).await;
                persist(store, record).await;
            }
        }
        ExecutionMode::Parallel { workers } => {
            let slots = Arc::new(Semaphore::new(workers.max(1)));
            let mut running = JoinSet::new();

            for (task, interaction) in pairs {
                let evaluator = Arc::clone(&evaluator);
                let slots = Arc::clone(&slots);
                running.spawn(async move {
                    let _slot = slots.acquire_owned().await.ok();
                    evaluate_guarded(evaluator, task, interaction).await
                });
            }

            while let Some(joined) = running.join_next().await {
                match joined {
                    Ok(record) => persist(store, record).await,
                    Err(e) => error!(error = %e, "worker failed"),
                }
            }
        }
    }

    let summary = store.finish(total, summary_path).await?;
    info!(
        total = summary.total_tasks,
        successful = summary.successful_tasks,
        "batch complete"
    );
    Ok(summary)
}

async fn persist(store: &EvaluationStore, record: EvaluationRecord) {
    let task_id = record.task_id.clone();
    if let Err(e) = store.append(record).await {
        warn!(task_id = %task_id, error = %e, "failed to write progress record");
    }
}
