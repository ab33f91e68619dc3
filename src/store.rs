//! Serialized output store for evaluation records.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::score::EvaluationRecord;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Task and success counts for one group of tasks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub total: usize,
    pub successful: usize,
}

impl GroupStats {
    /// Success percentage, 0 for an empty group
    pub fn success_rate(&self) -> f64 {
        percentage(self.successful, self.total)
    }

    fn add(&mut self, success: bool) {
        self.total += 1;
        if success {
            self.successful += 1;
        }
    }
}

/// Run-level output: counts, breakdowns and every record, sorted by task id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationSummary {
    pub total_tasks: usize,
    pub successful_tasks: usize,

    /// Successful tasks as a percentage of all tasks
    #[serde(default)]
    pub success_rate: f64,

    /// Failed tasks per failure category
    #[serde(default)]
    pub failure_reasons: BTreeMap<String, usize>,

    /// Outcomes per interaction kind
    #[serde(default)]
    pub by_interaction: BTreeMap<String, GroupStats>,

    /// Outcomes per site
    #[serde(default)]
    pub by_site: BTreeMap<String, GroupStats>,

    pub evaluations: Vec<EvaluationRecord>,
}

impl EvaluationSummary {
    pub fn from_records(total_tasks: usize, mut evaluations: Vec<EvaluationRecord>) -> Self {
        evaluations.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        let successful_tasks = evaluations.iter().filter(|e| e.success).count();

        let mut failure_reasons = BTreeMap::new();
        let mut by_interaction: BTreeMap<String, GroupStats> = BTreeMap::new();
        let mut by_site: BTreeMap<String, GroupStats> = BTreeMap::new();
        for record in &evaluations {
            if let Some(category) = record.failure_category() {
                *failure_reasons.entry(category.as_str().to_string()).or_insert(0) += 1;
            }
            let kind = record.interaction_kind.map_or("unknown", |k| k.as_str());
            by_interaction.entry(kind.to_string()).or_default().add(record.success);
            let site = record.site.as_deref().unwrap_or("unknown");
            by_site.entry(site.to_string()).or_default().add(record.success);
        }

        Self {
            total_tasks,
            successful_tasks,
            success_rate: percentage(successful_tasks, total_tasks),
            failure_reasons,
            by_interaction,
            by_site,
            evaluations,
        }
    }

    /// Mean final score, 0 for an empty run
    pub fn average_score(&self) -> f64 {
        if self.evaluations.is_empty() {
            return 0.0;
        }
        self.evaluations.iter().map(|e| e.final_score).sum::<f64>() / self.evaluations.len() as f64
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

struct StoreInner {
    progress: Option<(PathBuf, tokio::fs::File)>,
    records: Vec<EvaluationRecord>,
}

/// Collects records from concurrent evaluations, one writer at a time.
///
/// Records are kept in memory and, when opened on a file, also appended
/// to it as JSON lines in completion order.
pub struct EvaluationStore {
    inner: Mutex<StoreInner>,
}

impl EvaluationStore {
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                progress: None,
                records: Vec::new(),
            }),
        }
    }

    /// Store that also appends to `progress_path`, truncating it first.
    pub async fn open(progress_path: &Path) -> StoreResult<Self> {
        let file = tokio::fs::File::create(progress_path)
            .await
            .map_err(|source| StoreError::Io {
                path: progress_path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            inner: Mutex::new(StoreInner {
                progress: Some((progress_path.to_path_buf(), file)),
                records: Vec::new(),
            }),
        })
    }

    /// Add a record. It is kept even if the progress write fails.
    pub async fn append(&self, record: EvaluationRecord) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let line = serde_json::to_string(&record)?;
        inner.records.push(record);

        if let Some((path, file)) = inner.progress.as_mut() {
            let io_err = |source| StoreError::Io {
                path: path.clone(),
                source,
            };
            file.write_all(line.as_bytes()).await.map_err(io_err)?;
            file.write_all(b"\n").await.map_err(io_err)?;
            file.flush().await.map_err(io_err)?;
        }

        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Build the summary, writing it to `summary_path` when given.
    pub async fn finish(
        &self,
        total_tasks: usize,
        summary_path: Option<&Path>,
    ) -> StoreResult<EvaluationSummary> {
        let records = self.inner.lock().await.records.clone();
        let summary = EvaluationSummary::from_records(total_tasks, records);

        if let Some(path) = summary_path {
            let json = serde_json::to_string_pretty(&summary)?;
            tokio::fs::write(path, json)
                .await
                .map_err(|source| StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::Aggregator;
    use crate::task::InteractionKind;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(task_id: &str) -> EvaluationRecord {
        Aggregator::default().execution_failure(task_id, "element not found", Utc::now())
    }

    #[tokio::test]
    async fn test_summary_is_sorted_and_counted() {
        let store = EvaluationStore::in_memory();
        store.append(record("t3")).await.unwrap();
        store.append(record("t1")).await.unwrap();
        let mut passing = record("t2");
        passing.success = true;
        store.append(passing).await.unwrap();

        let summary = store.finish(4, None).await.unwrap();
        let ids: Vec<_> = summary.evaluations.iter().map(|e| e.task_id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t2", "t3"]);
        assert_eq!(summary.total_tasks, 4);
        assert_eq!(summary.successful_tasks, 1);
    }

    #[tokio::test]
    async fn test_progress_and_summary_files() {
        let dir = TempDir::new().unwrap();
        let progress = dir.path().join("evaluations.jsonl");
        let summary_path = dir.path().join("evaluation.json");

        let store = EvaluationStore::open(&progress).await.unwrap();
        store.append(record("b")).await.unwrap();
        store.append(record("a")).await.unwrap();
        assert_eq!(store.len().await, 2);

        let lines = std::fs::read_to_string(&progress).unwrap();
        assert_eq!(lines.lines().count(), 2);
        assert!(lines.lines().next().unwrap().contains("\"taskId\":\"b\""));

        store.finish(2, Some(&summary_path)).await.unwrap();
        let written: EvaluationSummary =
            serde_json::from_str(&std::fs::read_to_string(&summary_path).unwrap()).unwrap();
        assert_eq!(written.evaluations[0].task_id, "a");
        assert_eq!(written.successful_tasks, 0);
    }

    #[test]
    fn test_average_score() {
        let summary = EvaluationSummary::from_records(0, vec![]);
        assert_eq!(summary.average_score(), 0.0);
        assert_eq!(summary.success_rate, 0.0);
    }

    #[test]
    fn test_summary_breakdowns() {
        let clicked = |id: &str, site: &str| {
            record(id).labelled(InteractionKind::Click, Some(site.to_string()))
        };
        let mut passing = clicked("a", "shop.com");
        passing.success = true;
        let records = vec![
            passing,
            clicked("b", "shop.com"),
            Aggregator::default()
                .execution_failure("c", "evaluation timed out after 5.0s", Utc::now())
                .labelled(InteractionKind::Type, Some("news.org".to_string())),
            record("d"),
        ];

        let summary = EvaluationSummary::from_records(4, records);
        assert_eq!(summary.success_rate, 25.0);
        assert_eq!(summary.failure_reasons.get("element_not_found"), Some(&2));
        assert_eq!(summary.failure_reasons.get("timeout"), Some(&1));
        assert_eq!(
            summary.by_interaction.get("click"),
            Some(&GroupStats { total: 2, successful: 1 })
        );
        assert_eq!(summary.by_interaction["type"].success_rate(), 0.0);
        assert_eq!(summary.by_interaction["unknown"].total, 1);
        assert_eq!(summary.by_site["shop.com"].success_rate(), 50.0);
        assert_eq!(summary.by_site["news.org"].total, 1);
    }
}
