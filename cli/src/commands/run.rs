use std::sync::Arc;

use taskwave_core::api::{
    AppConfig, CliError, ExecutionResult, ServicesFactory, Task, TaskManager, WaveScheduler,
};
use taskwave_plugins::executor::{build_renderer, build_retry_strategy};
use taskwave_plugins::plan::load_plan;
use taskwave_plugins::services::PluginServicesFactory;

use super::cli::RunArgs;

pub async fn run(args: RunArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let specs = load_plan(&args.plan)?;

    let format = args
        .format
        .map(|f| f.as_str().to_string())
        .unwrap_or_else(|| cfg.output.format.clone());
    let concurrency = args
        .concurrency
        .unwrap_or(cfg.scheduler.concurrency_limit)
        .max(1);

    let mut builder = WaveScheduler::builder()
        .concurrency_limit(concurrency)
        .renderer(build_renderer(&format, &cfg.output))
        .progress_bar(args.progress || cfg.scheduler.progress_bar);
    if let Some(strategy) = build_retry_strategy(&cfg.retry) {
        builder = builder.retry_strategy(strategy);
    }

    let services = PluginServicesFactory::default().build_services(cfg).await?;
    let manager = TaskManager::new(services, builder.build(), cfg.manager.clone());
    manager.wait_until_loaded().await;

    let tasks: Vec<Arc<Task>> = specs
        .into_iter()
        .map(|spec| manager.add_existing_task(spec, None))
        .collect();

    let run_ids: Vec<String> = if args.only.is_empty() {
        tasks.iter().map(|t| t.id().to_string()).collect()
    } else {
        args.only.clone()
    };

    let interrupt = {
        let manager = manager.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let cancelled = manager.cancel_all();
                tracing::warn!(cancelled, "interrupted; cancelling remaining tasks");
            }
        })
    };

    let report = manager.run_report(Some(run_ids.as_slice())).await;
    interrupt.abort();

    if format != "jsonl" {
        print!("{}", summary(&report, &run_ids));
    }

    Ok(if report.all_succeeded() { 0 } else { 1 })
}

/// One line per task, in the order the tasks were requested.
fn summary(report: &ExecutionResult, order: &[String]) -> String {
    let mut out = String::new();
    for id in order {
        let Some(result) = report.task_results.get(id) else {
            continue;
        };
        let line = match (&result.error, result.success) {
            (_, true) => format!("{id}: completed"),
            (Some(err), false) => format!("{id}: failed [{}] {err}", err.error_code().as_u16()),
            (None, false) => format!("{id}: failed"),
        };
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str(&format!(
        "{} succeeded, {} failed in {} wave(s), {}ms\n",
        report.succeeded,
        report.failed,
        report.waves.len(),
        report.duration_ms
    ));
    out
}
