pub mod load;
pub mod types;

pub use load::{load_interactions, load_tasks, pair_tasks};
pub use types::{
    GroundTruth, InteractionKind, InteractionRecord, SelectorKind, TargetSelector, TaskDescriptor,
    TaskError, TaskResult,
};
