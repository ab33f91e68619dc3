//! Loading task files and executor results.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::warn;

use super::types::{InteractionRecord, TaskDescriptor, TaskError, TaskResult};

/// Load tasks from a JSONL file, one task per non-empty line.
///
/// Lines that fail to parse are logged and skipped; they carry no usable id.
pub fn load_tasks(path: &Path) -> TaskResult<Vec<TaskDescriptor>> {
    let content = fs::read_to_string(path)?;
    Ok(parse_tasks(&content, path))
}

fn parse_tasks(content: &str, path: &Path) -> Vec<TaskDescriptor> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(i, line)| match serde_json::from_str::<TaskDescriptor>(line) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(path = %path.display(), line = i + 1, error = %e, "skipping unparseable task");
                None
            }
        })
        .collect()
}

/// Load interaction records from a JSON array (or a single object).
///
/// Array elements that fail to parse are logged and skipped; their tasks are
/// then paired with a failed record.
pub fn load_interactions(path: &Path) -> TaskResult<Vec<InteractionRecord>> {
    let content = fs::read_to_string(path)?;
    parse_interactions(&content, path).map_err(|e| TaskError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn parse_interactions(content: &str, path: &Path) -> serde_json::Result<Vec<InteractionRecord>> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    match value {
        serde_json::Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| match serde_json::from_value::<InteractionRecord>(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(path = %path.display(), index = i, error = %e, "skipping unparseable result");
                    None
                }
            })
            .collect()),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}

/// Pair each task with its interaction record.
///
/// Tasks without a record get a failed record so every task is still
/// evaluated. Records for unknown tasks are dropped with a warning.
pub fn pair_tasks(
    tasks: Vec<TaskDescriptor>,
    interactions: Vec<InteractionRecord>,
) -> Vec<(TaskDescriptor, InteractionRecord)> {
    let mut by_id: HashMap<String, InteractionRecord> = HashMap::new();
    for record in interactions {
        if by_id.contains_key(&record.task_id) {
            warn!(task_id = %record.task_id, "duplicate interaction record, keeping the first");
            continue;
        }
        by_id.insert(record.task_id.clone(), record);
    }

    let pairs: Vec<_> = tasks
        .into_iter()
        .map(|task| {
            let record = by_id
                .remove(&task.id)
                .unwrap_or_else(|| InteractionRecord::failed(&task.id, "no interaction record"));
            (task, record)
        })
        .collect();

    for task_id in by_id.keys() {
        warn!(task_id = %task_id, "interaction record has no matching task");
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::types::{InteractionKind, SelectorKind};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    const DATASET_LINE: &str = r#"{"id": "search_1", "task": "Click the search button", "web": "https://example.com", "element_type": "button", "interaction": "click", "target_element": {"type": "id", "value": "btn1"}, "target_html": "<button id=\"btn1\">Search</button>", "ground_truth": {"screenshot": "gt/search_1.png", "description": "Results shown", "visual_changes": ["Results appear"], "success_criteria": ["Results list visible"]}}"#;

    #[test]
    fn test_parse_dataset_task() {
        let tasks = parse_tasks(DATASET_LINE, Path::new("tasks.jsonl"));
        assert_eq!(tasks.len(), 1);
        let task = &tasks[0];
        assert_eq!(task.id, "search_1");
        assert_eq!(task.url.as_deref(), Some("https://example.com"));
        assert_eq!(task.interaction_kind, InteractionKind::Click);
        assert_eq!(task.target_selector.kind, SelectorKind::Id);
        assert_eq!(task.expected_html, r#"<button id="btn1">Search</button>"#);
        assert_eq!(task.ground_truth.screenshot_path, PathBuf::from("gt/search_1.png"));
        assert_eq!(task.ground_truth.expected_visual_changes, vec!["Results appear"]);
        assert!(task.validate().is_ok());
        assert_eq!(task.site().as_deref(), Some("example.com"));

        let mut offline = task.clone();
        offline.url = None;
        assert_eq!(offline.site().as_deref(), Some("search"));
    }

    #[test]
    fn test_parse_tasks_skips_bad_lines() {
        let content = format!("{}\n\nnot json\n{{\"id\": \"x\"}}\n", DATASET_LINE);
        let tasks = parse_tasks(&content, Path::new("tasks.jsonl"));
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn test_parse_interactions_array_and_object() {
        let array = r#"[{"task_id": "a", "html_element": "<a>x</a>", "before_screenshot": "b.png", "after_screenshot": "c.png", "success": true}]"#;
        let records = parse_interactions(array, Path::new("results.json")).unwrap();
        assert_eq!(records[0].task_id, "a");
        assert_eq!(records[0].actual_html.as_deref(), Some("<a>x</a>"));
        assert_eq!(records[0].error_info, None);

        let single = r#"{"taskId": "b", "errorInfo": "element not found"}"#;
        let records = parse_interactions(single, Path::new("results.json")).unwrap();
        assert_eq!(records[0].error_info.as_deref(), Some("element not found"));
    }

    #[test]
    fn test_bad_result_element_is_skipped() {
        let array = r#"[{"task_id": "a", "html_element": "<a>x</a>"}, {"html_element": "<b>y</b>"}]"#;
        let records = parse_interactions(array, Path::new("results.json")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].task_id, "a");

        let tasks = parse_tasks(DATASET_LINE, Path::new("tasks.jsonl"));
        let pairs = pair_tasks(tasks, records);
        assert_eq!(pairs[0].1.error_info.as_deref(), Some("no interaction record"));
    }

    #[test]
    fn test_pair_tasks_fills_missing_records() {
        let mut tasks = parse_tasks(DATASET_LINE, Path::new("tasks.jsonl"));
        let mut second = tasks[0].clone();
        second.id = "search_2".to_string();
        tasks.push(second);

        let interactions = vec![
            InteractionRecord {
                task_id: "search_1".to_string(),
                actual_html: Some("<button>Search</button>".to_string()),
                ..Default::default()
            },
            InteractionRecord::failed("orphan", "boom"),
        ];

        let pairs = pair_tasks(tasks, interactions);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].1.actual_html.as_deref(), Some("<button>Search</button>"));
        assert_eq!(pairs[1].1.task_id, "search_2");
        assert_eq!(pairs[1].1.error_info.as_deref(), Some("no interaction record"));
    }

    #[test]
    fn test_validate_input_text_invariant() {
        let mut task = parse_tasks(DATASET_LINE, Path::new("tasks.jsonl")).remove(0);
        task.interaction_kind = InteractionKind::Type;
        assert!(matches!(task.validate(), Err(TaskError::Invalid { .. })));

        task.input_text = Some("rust".to_string());
        assert!(task.validate().is_ok());
        assert!(task.judge_context().interaction.contains("\"rust\""));

        task.interaction_kind = InteractionKind::Hover;
        assert!(matches!(task.validate(), Err(TaskError::Invalid { .. })));
    }
}
