use std::collections::HashMap;

use serde::Serialize;

use crate::task::TaskResult;

/// Outcome of one scheduler run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub run_id: String,

    /// Size of the run-set.
    pub total_tasks: usize,

    pub succeeded: usize,

    /// Includes cancelled and unresolved tasks.
    pub failed: usize,

    pub duration_ms: u64,

    /// Task ids in the order they were dispatched, one entry per wave.
    pub waves: Vec<Vec<String>>,

    /// Exactly one entry per task of the run-set.
    pub task_results: HashMap<String, TaskResult>,
}

impl ExecutionResult {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.succeeded == self.total_tasks
    }
}
