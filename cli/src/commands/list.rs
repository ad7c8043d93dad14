use std::sync::Arc;

use taskwave_core::api::{AppConfig, CliError, ServicesFactory, Task, TaskManager};
use taskwave_plugins::services::PluginServicesFactory;

use super::cli::ListArgs;

pub async fn list(args: ListArgs, cfg: &AppConfig) -> Result<i32, CliError> {
    let services = PluginServicesFactory::default().build_services(cfg).await?;
    let manager = TaskManager::from_config(cfg, services);
    manager.wait_until_loaded().await;

    let tasks = filter(&manager, &args);
    if tasks.is_empty() {
        println!("no tasks");
        return Ok(0);
    }
    for task in &tasks {
        println!("{}", format_row(task));
    }
    Ok(0)
}

fn filter(manager: &TaskManager, args: &ListArgs) -> Vec<Arc<Task>> {
    let tasks = match args.agent.as_deref() {
        Some(agent) => manager.get_tasks_by_agent(agent),
        None => manager.get_all_tasks(),
    };
    match args.session.as_deref() {
        Some(session) => tasks
            .into_iter()
            .filter(|t| t.session_id() == Some(session))
            .collect(),
        None => tasks,
    }
}

fn format_row(task: &Task) -> String {
    format!(
        "{}\t{}\t{}\tretries={}/{}",
        task.id(),
        task.status(),
        task.name(),
        task.retries(),
        task.max_retries()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskwave_core::api::{CapabilityCatalog, ManagerConfig, Services, TaskSpec, WaveScheduler};

    #[tokio::test]
    async fn filters_by_agent_and_session() {
        let manager = TaskManager::new(
            Services::new(Arc::new(CapabilityCatalog::new())),
            WaveScheduler::default(),
            ManagerConfig::default(),
        );
        manager.add_existing_task(TaskSpec::new("a").with_id("a").with_agent("x").with_session("s1"), None);
        manager.add_existing_task(TaskSpec::new("b").with_id("b").with_agent("x").with_session("s2"), None);
        manager.add_existing_task(TaskSpec::new("c").with_id("c").with_agent("y").with_session("s1"), None);

        let args = ListArgs {
            agent: Some("x".into()),
            session: Some("s1".into()),
        };
        let ids: Vec<String> = filter(&manager, &args)
            .iter()
            .map(|t| t.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a"]);

        let row = format_row(&manager.get_task("b").unwrap());
        assert_eq!(row, "b\tpending\tb\tretries=0/0");
    }
}
