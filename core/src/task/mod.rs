//! A single unit of schedulable work and its status state machine.
//!
//! `pending → running → {completed, failed}` within one attempt; the wave
//! scheduler may move a failed task back to `pending` for another attempt.

#[allow(clippy::module_inception)]
mod task;
mod types;

pub(crate) use task::merge_into_input;
pub use task::Task;
pub use types::{
    is_empty_value, TaskResult, TaskSpec, TaskStatus, DEPENDENCY_OUTPUTS_KEY, SESSION_CONTEXT_KEY,
};
