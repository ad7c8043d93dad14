use crate::executor::types::ExecutionResult;
use crate::task::TaskResult;

/// Observes a scheduler run. Rendering must not block the scheduler.
pub trait OutputRendererPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn format(&self) -> &str;
    fn supports_streaming(&self) -> bool {
        false
    }
    fn render(&self, event: &RenderEvent);
}

#[derive(Debug, Clone)]
pub enum RenderEvent {
    RunStart {
        run_id: String,
        total_tasks: usize,
        concurrency_limit: usize,
    },
    WaveStart {
        run_id: String,
        wave_id: usize,
        task_ids: Vec<String>,
    },
    TaskStart {
        run_id: String,
        task_id: String,
        wave_id: usize,
        attempt: u32,
    },
    TaskRetry {
        run_id: String,
        task_id: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    TaskComplete {
        run_id: String,
        task_id: String,
        result: TaskResult,
        duration_ms: u64,
        retries: u32,
    },
    WaveEnd {
        run_id: String,
        wave_id: usize,
    },
    /// A task never became ready and was failed at drain time.
    Unresolved {
        run_id: String,
        task_id: String,
        pending: Vec<String>,
    },
    RunEnd {
        run_id: String,
        result: ExecutionResult,
    },
}
