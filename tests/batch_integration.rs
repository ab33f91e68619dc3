//! Integration tests for end-to-end batch evaluation

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use dom_eval::judge::{
    Judge, JudgeRequest, JudgeResult, MockBehavior, MockJudge, PixelJudge, VisualJudgment,
};
use dom_eval::runner::{Evaluator, ExecutionMode, run_batch};
use dom_eval::score::VisualStatus;
use dom_eval::session::{PROGRESS_FILE, SUMMARY_FILE, Session, list_sessions};
use dom_eval::store::{EvaluationStore, EvaluationSummary};
use dom_eval::task::{InteractionRecord, TaskDescriptor, load_interactions, load_tasks, pair_tasks};

fn fixed_clock() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn task_line(id: &str) -> String {
    serde_json::json!({
        "id": id,
        "task": "Click the search button",
        "web": "https://example.com",
        "element_type": "button",
        "interaction": "click",
        "target_element": { "type": "id", "value": "btn1" },
        "target_html": "<button id=\"btn1\" class=\"search-btn\">Search</button>",
        "ground_truth": {
            "screenshot": "gt.png",
            "description": "Search results are shown",
            "visual_changes": ["Results appear"],
            "success_criteria": ["Results list visible"]
        }
    })
    .to_string()
}

fn pairs(count: usize) -> Vec<(TaskDescriptor, InteractionRecord)> {
    (1..=count)
        .map(|i| {
            let id = format!("task_{}", i);
            let task: TaskDescriptor = serde_json::from_str(&task_line(&id)).unwrap();
            let record = InteractionRecord {
                task_id: id,
                actual_html: Some(r#"<button id="btn1" class="search-btn">Search</button>"#.to_string()),
                before_screenshot: Some("before.png".into()),
                after_screenshot: Some("after.png".into()),
                error_info: None,
            };
            (task, record)
        })
        .collect()
}

async fn run(judge: impl Judge + 'static, mode: ExecutionMode) -> EvaluationSummary {
    let evaluator = Arc::new(
        Evaluator::new(Arc::new(judge))
            .with_clock(fixed_clock)
            .with_task_timeout(Duration::from_millis(200)),
    );
    let store = EvaluationStore::in_memory();
    run_batch(evaluator, pairs(5), mode, &store, None)
        .await
        .unwrap()
}

/// Judge that takes `delay` per call and tracks how many calls overlap
struct PacedJudge {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl PacedJudge {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Judge for PacedJudge {
    fn name(&self) -> &str {
        "paced"
    }

    async fn judge(&self, _request: &JudgeRequest) -> JudgeResult<VisualJudgment> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(VisualJudgment {
            score: 1.0,
            rationale: "matches".to_string(),
            raw_response: "{\"score\": 100}".to_string(),
        })
    }
}

#[tokio::test]
async fn test_judge_ceiling_holds_with_more_workers() {
    let judge = Arc::new(PacedJudge::new(Duration::from_millis(20)));
    let evaluator = Arc::new(
        Evaluator::new(judge.clone())
            .with_clock(fixed_clock)
            .with_judge_concurrency(2),
    );
    let store = EvaluationStore::in_memory();
    let summary = run_batch(evaluator, pairs(8), ExecutionMode::parallel(6), &store, None)
        .await
        .unwrap();

    assert_eq!(summary.successful_tasks, 8);
    let max = judge.max_in_flight.load(Ordering::SeqCst);
    assert!(max >= 1 && max <= 2, "max in flight {}", max);
}

#[tokio::test]
async fn test_queued_judge_calls_do_not_time_out() {
    let evaluator = Arc::new(
        Evaluator::new(Arc::new(PacedJudge::new(Duration::from_millis(100))))
            .with_clock(fixed_clock)
            .with_judge_concurrency(1)
            .with_task_timeout(Duration::from_millis(250)),
    );
    let store = EvaluationStore::in_memory();
    let summary = run_batch(evaluator, pairs(4), ExecutionMode::parallel(4), &store, None)
        .await
        .unwrap();

    for record in &summary.evaluations {
        assert_eq!(record.execution_error, None, "{}", record.task_id);
    }
    assert_eq!(summary.successful_tasks, 4);
}

#[tokio::test]
async fn test_failed_task_leaves_others_unchanged() {
    let baseline = run(MockJudge::with_score(0.95), ExecutionMode::Sequential).await;
    let degraded = run(
        MockJudge::with_score(0.95).for_task("task_3", MockBehavior::Unavailable),
        ExecutionMode::Sequential,
    )
    .await;

    assert_eq!(degraded.evaluations.len(), 5);
    for (a, b) in baseline.evaluations.iter().zip(&degraded.evaluations) {
        if a.task_id == "task_3" {
            assert_eq!(b.visual_status, VisualStatus::EvaluatorUnavailable);
            assert!(!b.success);
        } else {
            assert_eq!(a, b);
        }
    }
    assert_eq!(baseline.successful_tasks, 5);
    assert_eq!(degraded.successful_tasks, 4);
}

#[tokio::test]
async fn test_hanging_task_times_out_without_blocking_batch() {
    let summary = run(
        MockJudge::with_score(1.0).for_task("task_2", MockBehavior::Hang),
        ExecutionMode::parallel(2),
    )
    .await;

    assert_eq!(summary.evaluations.len(), 5);
    let hung = &summary.evaluations[1];
    assert_eq!(hung.task_id, "task_2");
    assert!(hung.execution_error.as_deref().unwrap().contains("timed out"));
    assert_eq!(summary.successful_tasks, 4);
}

#[tokio::test]
async fn test_sequential_and_parallel_agree() {
    let judge = || {
        MockJudge::with_score(0.8)
            .for_task("task_1", MockBehavior::Raw("Score: 97/100".to_string()))
            .for_task("task_4", MockBehavior::Raw("no idea".to_string()))
    };

    let sequential = run(judge(), ExecutionMode::Sequential).await;
    let parallel = run(judge(), ExecutionMode::parallel(4)).await;
    assert_eq!(sequential, parallel);

    assert!(sequential.evaluations[0].success);
    assert_eq!(
        sequential.evaluations[3].visual_status,
        VisualStatus::MalformedResponse
    );
}

#[tokio::test]
async fn test_flaky_judge_behind_retries() {
    use dom_eval::judge::{RetryPolicy, RetryingJudge};

    let judge = RetryingJudge::new(
        MockJudge::new(MockBehavior::Flaky {
            failures: 2,
            score: 1.0,
        }),
        RetryPolicy::immediate(3),
    );
    let summary = run(judge, ExecutionMode::Sequential).await;
    assert_eq!(summary.successful_tasks, 5);
}

#[tokio::test]
async fn test_evaluate_from_files_writes_run_directory() {
    let dir = TempDir::new().unwrap();

    let tasks_path = dir.path().join("tasks.jsonl");
    let lines: Vec<String> = ["a", "b", "c"].iter().map(|id| task_line(id)).collect();
    fs::write(&tasks_path, lines.join("\n")).unwrap();

    let results_path = dir.path().join("results.json");
    fs::write(
        &results_path,
        serde_json::json!([
            {
                "task_id": "a",
                "html_element": "<button id=\"btn1\" class=\"search-btn\">Search</button>",
                "before_screenshot": "before.png",
                "after_screenshot": "after.png",
                "success": true
            },
            { "task_id": "b", "error": "element not found", "success": false }
        ])
        .to_string(),
    )
    .unwrap();

    let tasks = load_tasks(&tasks_path).unwrap();
    let interactions = load_interactions(&results_path).unwrap();
    let pairs = pair_tasks(tasks, interactions);
    assert_eq!(pairs.len(), 3);

    let session = Session::in_dir(dir.path().join("run"));
    session.init("mock", 0.9, pairs.len()).unwrap();
    let store = EvaluationStore::open(&session.progress_path()).await.unwrap();

    let evaluator = Arc::new(Evaluator::new(Arc::new(MockJudge::with_score(0.95))));
    let summary = run_batch(
        evaluator,
        pairs,
        ExecutionMode::parallel(2),
        &store,
        Some(&session.summary_path()),
    )
    .await
    .unwrap();

    assert_eq!(summary.total_tasks, 3);
    assert_eq!(summary.successful_tasks, 1);
    assert_eq!(
        summary.evaluations[1].execution_error.as_deref(),
        Some("element not found")
    );
    assert_eq!(
        summary.evaluations[2].execution_error.as_deref(),
        Some("no interaction record")
    );
    assert!((summary.success_rate - 100.0 / 3.0).abs() < 1e-9);
    assert_eq!(summary.failure_reasons.get("element_not_found"), Some(&1));
    assert_eq!(summary.failure_reasons.get("execution_error"), Some(&1));
    assert_eq!(summary.by_interaction["click"].total, 3);
    assert_eq!(summary.by_site["example.com"].successful, 1);

    let progress = fs::read_to_string(session.dir.join(PROGRESS_FILE)).unwrap();
    assert_eq!(progress.lines().count(), 3);

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(session.dir.join(SUMMARY_FILE)).unwrap()).unwrap();
    assert_eq!(written["totalTasks"], 3);
    assert_eq!(written["successfulTasks"], 1);
    assert_eq!(written["byInteraction"]["click"]["total"], 3);
    assert_eq!(written["evaluations"][0]["taskId"], "a");

    let runs = list_sessions(dir.path()).unwrap();
    assert_eq!(runs, vec![session.dir.clone()]);
    let listed: EvaluationSummary =
        serde_json::from_str(&fs::read_to_string(runs[0].join(SUMMARY_FILE)).unwrap()).unwrap();
    assert_eq!(listed.successful_tasks, summary.successful_tasks);
    assert_eq!(listed.failure_reasons, summary.failure_reasons);
    assert_eq!(listed.by_site, summary.by_site);
}

#[tokio::test]
async fn test_pixel_judge_batch_with_real_screenshots() {
    use image::{Rgba, RgbaImage};

    let dir = TempDir::new().unwrap();
    let shot = |name: &str, shade: u8| {
        let path = dir.path().join(name);
        RgbaImage::from_pixel(16, 16, Rgba([shade, shade, shade, 255]))
            .save(&path)
            .unwrap();
        path
    };
    let before = shot("before.png", 0);
    let after = shot("after.png", 255);
    let gt = shot("gt.png", 255);

    let mut batch = pairs(1);
    batch[0].0.ground_truth.screenshot_path = gt;
    batch[0].1.before_screenshot = Some(before);
    batch[0].1.after_screenshot = Some(after);

    let evaluator = Arc::new(Evaluator::new(Arc::new(PixelJudge)).with_clock(fixed_clock));
    let store = EvaluationStore::in_memory();
    let summary = run_batch(evaluator, batch, ExecutionMode::Sequential, &store, None)
        .await
        .unwrap();

    let record = &summary.evaluations[0];
    assert_eq!(record.visual_status, VisualStatus::Judged);
    assert!((record.visual_score - 1.0).abs() < 1e-9);
    assert!(record.success);
}
