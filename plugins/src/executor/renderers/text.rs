use taskwave_core::api::{OutputRendererPlugin, RenderEvent};

/// Human-readable, one line per event.
pub struct TextRendererPlugin {
    ascii_only: bool,
}

impl TextRendererPlugin {
    pub fn new(ascii_only: bool) -> Self {
        Self { ascii_only }
    }

    fn status_label(&self, success: bool) -> &'static str {
        match (success, self.ascii_only) {
            (true, true) => "OK",
            (true, false) => "✓ SUCCESS",
            (false, true) => "FAIL",
            (false, false) => "✗ FAILED",
        }
    }

    fn format_event(&self, event: &RenderEvent) -> String {
        match event {
            RenderEvent::RunStart {
                run_id,
                total_tasks,
                concurrency_limit,
            } => format!(
                "RUN START {} (tasks: {}, concurrency: {})",
                run_id, total_tasks, concurrency_limit
            ),
            RenderEvent::WaveStart {
                run_id,
                wave_id,
                task_ids,
            } => format!(
                "WAVE START {} (wave {}, tasks: {})",
                run_id,
                wave_id,
                task_ids.join(", ")
            ),
            RenderEvent::TaskStart {
                run_id,
                task_id,
                wave_id,
                attempt,
            } => {
                let mut line = format!("TASK START {} (wave {}, task {})", run_id, wave_id, task_id);
                if *attempt > 0 {
                    line.push_str(&format!(" attempt {}", attempt + 1));
                }
                line
            }
            RenderEvent::TaskRetry {
                run_id,
                task_id,
                attempt,
                delay_ms,
                error,
            } => format!(
                "TASK RETRY {} (task {}, retry {}, in {}ms): {}",
                run_id, task_id, attempt, delay_ms, error
            ),
            RenderEvent::TaskComplete {
                run_id,
                task_id,
                result,
                duration_ms,
                retries,
            } => {
                let mut line = format!(
                    "TASK END {} (task {}, status {}, duration {}ms, retries {})",
                    run_id,
                    task_id,
                    self.status_label(result.success),
                    duration_ms,
                    retries
                );
                if let Some(err) = &result.error {
                    line.push_str(&format!(": {}", err));
                }
                line
            }
            RenderEvent::WaveEnd { run_id, wave_id } => {
                format!("WAVE END {} (wave {})", run_id, wave_id)
            }
            RenderEvent::Unresolved {
                run_id,
                task_id,
                pending,
            } => format!(
                "TASK UNRESOLVED {} (task {}, waiting on: {})",
                run_id,
                task_id,
                pending.join(", ")
            ),
            RenderEvent::RunEnd { run_id, result } => format!(
                "RUN END {} (succeeded {}, failed {}, waves {}, duration {}ms)",
                run_id,
                result.succeeded,
                result.failed,
                result.waves.len(),
                result.duration_ms
            ),
        }
    }
}

impl OutputRendererPlugin for TextRendererPlugin {
    fn name(&self) -> &str {
        "text-renderer"
    }

    fn format(&self) -> &str {
        "text"
    }

    fn render(&self, event: &RenderEvent) {
        println!("{}", self.format_event(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskwave_core::api::{TaskError, TaskResult};

    #[test]
    fn task_end_includes_error() {
        let renderer = TextRendererPlugin::new(true);
        let event = RenderEvent::TaskComplete {
            run_id: "run".to_string(),
            task_id: "task".to_string(),
            result: TaskResult::failure(TaskError::Model("timeout".into())),
            duration_ms: 5,
            retries: 2,
        };

        let line = renderer.format_event(&event);
        assert!(line.starts_with("TASK END run"));
        assert!(line.contains("status FAIL"));
        assert!(line.contains("retries 2"));
        assert!(line.ends_with("reasoning model call failed: timeout"));
    }

    #[test]
    fn unresolved_lists_pending_dependencies() {
        let renderer = TextRendererPlugin::new(false);
        let line = renderer.format_event(&RenderEvent::Unresolved {
            run_id: "run".to_string(),
            task_id: "a".to_string(),
            pending: vec!["b".to_string(), "c".to_string()],
        });
        assert_eq!(line, "TASK UNRESOLVED run (task a, waiting on: b, c)");
    }
}
