use chrono::Local;
use serde_json::{json, Value};
use taskwave_core::api::{OutputRendererPlugin, RenderEvent};

/// One JSON object per event on stdout, versioned with `"v": 1`.
pub struct JsonlRendererPlugin {
    pretty_print: bool,
}

impl JsonlRendererPlugin {
    pub fn new(pretty_print: bool) -> Self {
        Self { pretty_print }
    }

    fn event_to_json(&self, event: &RenderEvent) -> Value {
        let (event_type, run_id, task_id, metadata, extra) = match event {
            RenderEvent::RunStart {
                run_id,
                total_tasks,
                concurrency_limit,
            } => (
                "run.start",
                run_id,
                None,
                json!({ "total_tasks": total_tasks, "concurrency_limit": concurrency_limit }),
                None,
            ),
            RenderEvent::WaveStart {
                run_id,
                wave_id,
                task_ids,
            } => (
                "wave.start",
                run_id,
                None,
                json!({ "wave_id": wave_id, "tasks": task_ids }),
                None,
            ),
            RenderEvent::TaskStart {
                run_id,
                task_id,
                wave_id,
                attempt,
            } => (
                "task.start",
                run_id,
                Some(task_id),
                json!({ "wave_id": wave_id, "attempt": attempt }),
                None,
            ),
            RenderEvent::TaskRetry {
                run_id,
                task_id,
                attempt,
                delay_ms,
                error,
            } => (
                "task.retry",
                run_id,
                Some(task_id),
                json!({ "attempt": attempt, "delay_ms": delay_ms, "error": error }),
                None,
            ),
            RenderEvent::TaskComplete {
                run_id,
                task_id,
                result,
                duration_ms,
                retries,
            } => {
                let error_code = result.error.as_ref().map(|e| e.error_code().as_u16());
                (
                    "task.end",
                    run_id,
                    Some(task_id),
                    json!({ "duration_ms": duration_ms, "retries": retries, "error_code": error_code }),
                    Some(json!({
                        "success": result.success,
                        "output": result.output,
                        "error": result.error.as_ref().map(ToString::to_string),
                    })),
                )
            }
            RenderEvent::WaveEnd { run_id, wave_id } => {
                ("wave.end", run_id, None, json!({ "wave_id": wave_id }), None)
            }
            RenderEvent::Unresolved {
                run_id,
                task_id,
                pending,
            } => (
                "task.unresolved",
                run_id,
                Some(task_id),
                json!({ "pending": pending }),
                None,
            ),
            RenderEvent::RunEnd { run_id, result } => (
                "run.end",
                run_id,
                None,
                json!({
                    "total_tasks": result.total_tasks,
                    "succeeded": result.succeeded,
                    "failed": result.failed,
                    "waves": result.waves,
                    "duration_ms": result.duration_ms,
                }),
                None,
            ),
        };

        let mut line = json!({
            "v": 1,
            "event_type": event_type,
            "ts": Local::now().to_rfc3339(),
            "run_id": run_id,
        });
        if let Value::Object(obj) = &mut line {
            if let Some(task_id) = task_id {
                obj.insert("task_id".into(), json!(task_id));
            }
            if let Some(Value::Object(fields)) = extra {
                obj.extend(fields);
            }
            obj.insert("metadata".into(), metadata);
        }
        line
    }
}

impl OutputRendererPlugin for JsonlRendererPlugin {
    fn name(&self) -> &str {
        "jsonl-renderer"
    }

    fn format(&self) -> &str {
        "jsonl"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn render(&self, event: &RenderEvent) {
        let value = self.event_to_json(event);
        let line = if self.pretty_print {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        };
        println!("{}", line.unwrap_or_else(|_| "{}".into()));
    }
}
