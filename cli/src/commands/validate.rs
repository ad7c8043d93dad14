use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use taskwave_core::api::{AppConfig, CliError, DependencyResolver, Task};
use taskwave_plugins::plan::load_plan;

use super::cli::ValidateArgs;

pub fn validate(args: ValidateArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let specs = load_plan(&args.plan)?;
    let tasks: Vec<Arc<Task>> = specs
        .into_iter()
        .map(|spec| Arc::new(Task::new(spec, None)))
        .collect();

    let (report, has_cycle) = describe(&tasks, cfg.scheduler.effective_concurrency());
    print!("{report}");
    Ok(if has_cycle { 2 } else { 0 })
}

fn describe(tasks: &[Arc<Task>], concurrency_limit: usize) -> (String, bool) {
    let known: HashMap<String, Arc<Task>> = tasks
        .iter()
        .map(|t| (t.id().to_string(), t.clone()))
        .collect();
    let resolver = DependencyResolver::new(tasks, &known);
    let mut out = format!("{} task(s)\n", resolver.len());

    for (task_id, dep) in resolver.ignored_dependencies() {
        out.push_str(&format!("unknown dependency: {task_id} -> {dep} (ignored)\n"));
    }

    let cycle = resolver.validate().err();
    if let Some(err) = &cycle {
        out.push_str(&format!("{err}\n"));
    }

    let waves = resolver.preview_waves(concurrency_limit);
    for (i, wave) in waves.iter().enumerate() {
        out.push_str(&format!("wave {i}: {}\n", wave.join(", ")));
    }

    let scheduled: HashSet<&str> = waves.iter().flatten().map(String::as_str).collect();
    let stuck: Vec<&str> = resolver
        .task_ids()
        .iter()
        .map(String::as_str)
        .filter(|id| !scheduled.contains(id))
        .collect();
    if !stuck.is_empty() {
        out.push_str(&format!("never ready: {}\n", stuck.join(", ")));
    }

    (out, cycle.is_some())
}
