//! Task registry and entry point for scheduler runs.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::capability::ReasoningModel;
use crate::config::{AppConfig, ManagerConfig};
use crate::context::Services;
use crate::error::StoreError;
use crate::executor::{DependencyResolver, ExecutionResult, WaveScheduler};
use crate::task::{Task, TaskResult, TaskSpec};

/// Façade over the task registry and the [`WaveScheduler`].
///
/// Cheap to clone; clones share the registry. Registry methods are safe to
/// call while a run is in progress.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<Inner>,
}

struct Inner {
    registry: RwLock<Registry>,
    defaults: ManagerConfig,
    services: Arc<Services>,
    scheduler: WaveScheduler,
    loaded: watch::Receiver<bool>,
}

#[derive(Default)]
struct Registry {
    tasks: HashMap<String, Arc<Task>>,
    order: Vec<String>,
}

impl Registry {
    fn insert(&mut self, task: Arc<Task>) -> Arc<Task> {
        if let Some(existing) = self.tasks.get(task.id()) {
            return existing.clone();
        }
        self.order.push(task.id().to_string());
        self.tasks.insert(task.id().to_string(), task.clone());
        task
    }

    fn ordered(&self) -> Vec<Arc<Task>> {
        self.order
            .iter()
            .filter_map(|id| self.tasks.get(id).cloned())
            .collect()
    }
}

impl TaskManager {
    /// Creates a manager and starts loading persisted tasks in the background.
    ///
    /// Loading needs a Tokio runtime; without one the registry starts empty.
    pub fn new(services: Services, scheduler: WaveScheduler, defaults: ManagerConfig) -> Self {
        let (loaded_tx, loaded_rx) = watch::channel(false);
        let manager = Self {
            inner: Arc::new(Inner {
                registry: RwLock::new(Registry::default()),
                defaults,
                services: Arc::new(services),
                scheduler,
                loaded: loaded_rx,
            }),
        };

        match (&manager.inner.services.task_store, tokio::runtime::Handle::try_current()) {
            (Some(_), Ok(handle)) => {
                let loader = manager.clone();
                handle.spawn(async move {
                    loader.load_from_store().await;
                    let _ = loaded_tx.send(true);
                });
            }
            (Some(store), Err(_)) => {
                warn!(store = store.name(), "no async runtime; skipping task load");
                let _ = loaded_tx.send(true);
            }
            (None, _) => {
                let _ = loaded_tx.send(true);
            }
        }

        manager
    }

    /// Builds the scheduler and defaults from configuration. Retry strategy and
    /// renderer are left to the caller.
    pub fn from_config(cfg: &AppConfig, services: Services) -> Self {
        let scheduler = WaveScheduler::builder()
            .concurrency_limit(cfg.scheduler.effective_concurrency())
            .progress_bar(cfg.scheduler.progress_bar)
            .build();
        Self::new(services, scheduler, cfg.manager.clone())
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.inner.services
    }

    pub fn concurrency_limit(&self) -> usize {
        self.inner.scheduler.concurrency_limit()
    }

    /// Resolves once persisted tasks have been merged into the registry.
    pub async fn wait_until_loaded(&self) {
        let mut rx = self.inner.loaded.clone();
        if rx.wait_for(|done| *done).await.is_err() {
            // Sender dropped without signalling: the loader panicked.
            warn!("task loader ended without completing");
        }
    }

    pub fn is_loaded(&self) -> bool {
        *self.inner.loaded.borrow()
    }

    async fn load_from_store(&self) {
        let Some(store) = self.inner.services.task_store.clone() else {
            return;
        };

        match store.list().await {
            Ok(records) => {
                let total = records.len();
                let mut restored = 0usize;
                let mut registry = self.write_registry();
                for record in records {
                    if registry.tasks.contains_key(&record.id) {
                        continue;
                    }
                    let task = Task::from_record(record, self.inner.services.model.clone());
                    registry.insert(Arc::new(task));
                    restored += 1;
                }
                info!(store = store.name(), total, restored, "loaded persisted tasks");
            }
            Err(e) => warn!(store = store.name(), error = %e, "failed to load persisted tasks"),
        }
    }

    /// Registers a task, or returns the existing one when the id is known.
    ///
    /// Manager defaults fill in agent, session and model. Persistence happens
    /// in the background.
    pub fn add_existing_task(
        &self,
        spec: TaskSpec,
        model: Option<Arc<dyn ReasoningModel>>,
    ) -> Arc<Task> {
        let (task, created) = self.register(spec, model);
        if created {
            self.persist_in_background(task.clone());
        }
        task
    }

    /// Registers an already-built task instance, idempotent by id.
    pub fn add_task(&self, task: Arc<Task>) -> Arc<Task> {
        let registered = self.write_registry().insert(task.clone());
        if Arc::ptr_eq(&registered, &task) {
            self.persist_in_background(task);
        }
        registered
    }

    /// Like [`Self::add_existing_task`], but returns only after the durable
    /// record has been written.
    pub async fn create_task(
        &self,
        spec: TaskSpec,
        model: Option<Arc<dyn ReasoningModel>>,
    ) -> Result<Arc<Task>, StoreError> {
        let (task, _) = self.register(spec, model);
        if let Some(store) = &self.inner.services.task_store {
            task.write_record(store.as_ref()).await?;
        }
        Ok(task)
    }

    fn register(
        &self,
        mut spec: TaskSpec,
        model: Option<Arc<dyn ReasoningModel>>,
    ) -> (Arc<Task>, bool) {
        if let Some(existing) = spec.id.as_deref().and_then(|id| self.get_task(id)) {
            debug!(task_id = existing.id(), "task already registered");
            return (existing, false);
        }

        if spec.agent_id.is_none() {
            spec.agent_id = self.inner.defaults.agent_id.clone();
        }
        if spec.session_id.is_none() {
            spec.session_id = self.inner.defaults.session_id.clone();
        }
        let model = model.or_else(|| self.inner.services.model.clone());

        let task = Arc::new(Task::new(spec, model));
        let registered = self.write_registry().insert(task.clone());
        let created = Arc::ptr_eq(&registered, &task);
        if created {
            debug!(task_id = task.id(), name = task.name(), "task registered");
        }
        (registered, created)
    }

    fn persist_in_background(&self, task: Arc<Task>) {
        if self.inner.services.task_store.is_none() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(task_id = task.id(), "no async runtime; task not persisted");
            return;
        };
        let services = self.inner.services.clone();
        handle.spawn(async move { task.persist(&services).await });
    }

    pub fn get_task(&self, id: &str) -> Option<Arc<Task>> {
        self.read_registry().tasks.get(id).cloned()
    }

    /// All tasks in registration order.
    pub fn get_all_tasks(&self) -> Vec<Arc<Task>> {
        self.read_registry().ordered()
    }

    pub fn get_tasks_by_agent(&self, agent_id: &str) -> Vec<Arc<Task>> {
        self.get_all_tasks()
            .into_iter()
            .filter(|t| t.agent_id() == Some(agent_id))
            .collect()
    }

    pub fn get_tasks_by_session(&self, session_id: &str) -> Vec<Arc<Task>> {
        self.get_all_tasks()
            .into_iter()
            .filter(|t| t.session_id() == Some(session_id))
            .collect()
    }

    /// Runs the named tasks (all registered tasks for `None`) and returns one
    /// result per task. Unknown ids are dropped. Never fails.
    pub async fn run(&self, task_ids: Option<&[String]>) -> HashMap<String, TaskResult> {
        self.run_report(task_ids).await.task_results
    }

    /// [`Self::run`] with the full execution report.
    pub async fn run_report(&self, task_ids: Option<&[String]>) -> ExecutionResult {
        self.wait_until_loaded().await;

        let (run_set, known) = {
            let registry = self.read_registry();
            let run_set = match task_ids {
                None => registry.ordered(),
                Some(ids) => {
                    let mut seen = HashSet::new();
                    ids.iter()
                        .filter(|id| seen.insert(id.as_str()))
                        .filter_map(|id| {
                            let task = registry.tasks.get(id).cloned();
                            if task.is_none() {
                                debug!(task_id = %id, "unknown task id; dropping from run");
                            }
                            task
                        })
                        .collect()
                }
            };
            (run_set, registry.tasks.clone())
        };

        info!(
            tasks = run_set.len(),
            concurrency = self.concurrency_limit(),
            "starting run"
        );
        self.inner
            .scheduler
            .run(run_set, &known, self.inner.services.clone())
            .await
    }

    /// Executes one registered task directly, with outputs of its finished
    /// dependencies merged in. `None` for an unknown id.
    pub async fn execute_task(&self, id: &str) -> Option<TaskResult> {
        self.wait_until_loaded().await;

        let (task, known) = {
            let registry = self.read_registry();
            (registry.tasks.get(id).cloned()?, registry.tasks.clone())
        };

        let resolver = DependencyResolver::new(std::slice::from_ref(&task), &known);
        let input = resolver.build_input(id, &HashMap::new());
        Some(task.execute(input, &self.inner.services).await)
    }

    /// Returns true when the task existed and was not yet terminal.
    pub fn cancel_task(&self, id: &str) -> bool {
        match self.get_task(id) {
            Some(task) => task.cancel(),
            None => false,
        }
    }

    /// Cancels every registered task; returns how many were still live.
    pub fn cancel_all(&self) -> usize {
        self.get_all_tasks()
            .iter()
            .filter(|task| task.cancel())
            .count()
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.inner
            .registry
            .read()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, Registry> {
        self.inner
            .registry
            .write()
            .unwrap_or_else(|e| e.into_inner())
    }
}
