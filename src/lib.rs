//! DOM Eval - scoring web-agent interactions against ground truth.
//!
//! This crate provides:
//! - HTML similarity between the element an agent touched and the expected one
//! - Visual judgment of before/after screenshots by a vision-capable evaluator
//! - Weighted aggregation into a per-task success verdict
//! - Sequential or bounded-parallel batch evaluation with per-task isolation
//! - Run directories with incremental JSONL progress and a final summary
//!
//! # Example
//!
//! ```rust
//! use dom_eval::html::compare_html;
//! use dom_eval::score::final_score;
//!
//! let html = compare_html(
//!     Some(r#"<button id="btn1" class="search-btn">Search</button>"#),
//!     r#"<button id="btn1" class="search-btn">Search</button>"#,
//! );
//! assert!((html.total_score - 1.0).abs() < 1e-9);
//! assert!(final_score(0.95, html.total_score) > 0.9);
//! ```

pub mod config;
pub mod html;
pub mod judge;
pub mod runner;
pub mod score;
pub mod session;
pub mod store;
pub mod task;

// Re-export scoring types
pub use html::{HtmlComparison, HtmlScorer, compare_html};
pub use score::{Aggregator, EvaluationRecord, FailureCategory, VisualStatus, final_score};

// Re-export evaluator boundary
pub use judge::{
    Judge, JudgeContext, JudgeError, JudgeRequest, JudgeResult, VisualJudgment, build_judge,
    check_health,
};

// Re-export batch execution
pub use runner::{Evaluator, ExecutionMode, run_batch};
pub use store::{EvaluationStore, EvaluationSummary, GroupStats, StoreError, StoreResult};

// Re-export run directories
pub use session::{Session, list_sessions};

// Re-export task loading
pub use task::{InteractionRecord, TaskDescriptor, TaskError, load_interactions, load_tasks, pair_tasks};
