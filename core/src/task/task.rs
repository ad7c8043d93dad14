use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::capability::{
    Capability, CompletionOptions, Message, ReasoningModel, ToolSpec,
};
use crate::context::Services;
use crate::error::{StoreError, TaskError};
use crate::store::{upsert, ContextEntry, ContextEntryKind, TaskRecord, TaskStore};

use super::types::{TaskResult, TaskSpec, TaskStatus, SESSION_CONTEXT_KEY};

const AGENT_SYSTEM_MESSAGE: &str = "You are a task execution agent. \
Use the available tools to complete the task, then report the result.";

const SUMMARY_PROMPT: &str =
    "Summarize the tool results above into the final result of the task.";

/// A registered unit of work.
///
/// Identity and configuration are immutable; status, timestamps, retry
/// counter and result live behind a mutex so the manager, the scheduler and
/// `cancel()` callers can share one `Arc<Task>`.
pub struct Task {
    id: String,
    name: String,
    description: String,
    dependencies: Vec<String>,
    input: Value,
    max_retries: u32,
    plugins: Vec<String>,
    agent_id: Option<String>,
    session_id: Option<String>,
    context_id: Option<String>,
    model: Option<Arc<dyn ReasoningModel>>,
    created_at: DateTime<Utc>,
    cancelled: AtomicBool,
    /// `true` while an `execute` call owns the task.
    in_flight: watch::Sender<bool>,
    /// Serializes durable writes; the row is snapshotted while held.
    write_lock: tokio::sync::Mutex<()>,
    state: Mutex<TaskState>,
}

#[derive(Debug, Clone, Default)]
struct TaskState {
    status: TaskStatus,
    retries: u32,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    result: Option<TaskResult>,
}

/// Clears the in-flight flag even if the execution future panics or is dropped.
struct InFlightGuard<'a>(&'a watch::Sender<bool>);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl Task {
    /// Builds a task from its spec, assigning a fresh id when none is given.
    pub fn new(spec: TaskSpec, model: Option<Arc<dyn ReasoningModel>>) -> Self {
        let id = spec
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            dependencies: dedup_preserving_order(spec.dependencies),
            id,
            name: spec.name,
            description: spec.description,
            input: spec.input,
            max_retries: spec.max_retries,
            plugins: spec.plugins,
            agent_id: spec.agent_id,
            session_id: spec.session_id,
            context_id: spec.context_id,
            model,
            created_at: Utc::now(),
            cancelled: AtomicBool::new(false),
            in_flight: watch::channel(false).0,
            write_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(TaskState::default()),
        }
    }

    /// Rehydrates a task from its durable row.
    ///
    /// A row left in `running` belongs to an interrupted process and comes back
    /// as `pending`.
    pub fn from_record(record: TaskRecord, model: Option<Arc<dyn ReasoningModel>>) -> Self {
        let status = match record.status {
            TaskStatus::Running => TaskStatus::Pending,
            other => other,
        };
        let interrupted = record.status == TaskStatus::Running;

        let mut task = Self::new(
            TaskSpec {
                id: Some(record.id),
                name: record.name,
                description: record.description,
                dependencies: record.dependencies,
                input: record.input,
                max_retries: record.max_retries,
                plugins: record.plugins,
                agent_id: record.agent_id,
                session_id: record.session_id,
                context_id: record.context_id,
            },
            model,
        );
        task.created_at = record.created_at;
        task.state = Mutex::new(TaskState {
            status,
            retries: record.retries,
            started_at: if interrupted { None } else { record.started_at },
            completed_at: if interrupted { None } else { record.completed_at },
            result: if interrupted { None } else { record.result },
        });
        task
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn context_id(&self) -> Option<&str> {
        self.context_id.as_deref()
    }

    pub fn model(&self) -> Option<&Arc<dyn ReasoningModel>> {
        self.model.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> TaskStatus {
        self.lock_state().status
    }

    pub fn retries(&self) -> u32 {
        self.lock_state().retries
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.lock_state().started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.lock_state().completed_at
    }

    pub fn result(&self) -> Option<TaskResult> {
        self.lock_state().result.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn is_in_flight(&self) -> bool {
        *self.in_flight.borrow()
    }

    /// Waits until no `execute` call owns the task, then returns its result.
    pub async fn wait_until_idle(&self) -> Option<TaskResult> {
        let mut rx = self.in_flight.subscribe();
        // The sender lives as long as `self`, so this cannot see a closed channel.
        let _ = rx.wait_for(|busy| !*busy).await;
        self.result()
    }

    /// Durable row for the current state.
    pub fn to_record(&self) -> TaskRecord {
        let state = self.lock_state().clone();
        TaskRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            status: state.status,
            retries: state.retries,
            max_retries: self.max_retries,
            plugins: self.plugins.clone(),
            input: self.input.clone(),
            dependencies: self.dependencies.clone(),
            result: state.result,
            created_at: self.created_at,
            started_at: state.started_at,
            completed_at: state.completed_at,
            agent_id: self.agent_id.clone(),
            session_id: self.session_id.clone(),
            context_id: self.context_id.clone(),
        }
    }

    /// Marks the task cancelled.
    ///
    /// A `pending` or `running` task is forced to `failed` immediately. Work
    /// already inside a capability call is not interrupted; the next
    /// checkpoint stops it and its final status stays `failed`.
    pub fn cancel(&self) -> bool {
        let mut state = self.lock_state();
        if state.status.is_terminal() {
            return false;
        }
        self.cancelled.store(true, Ordering::Release);
        info!(task_id = %self.id, from = %state.status, "task cancelled");
        state.status = TaskStatus::Failed;
        state.result = Some(TaskResult::failure(TaskError::Cancelled));
        state.completed_at = Some(Utc::now());
        true
    }

    /// Moves a failed task back to `pending` for another attempt.
    ///
    /// Returns false for cancelled tasks and tasks that are not `failed`.
    pub fn prepare_retry(&self) -> bool {
        if self.is_cancelled() {
            return false;
        }
        let mut state = self.lock_state();
        if state.status != TaskStatus::Failed {
            return false;
        }
        state.status = TaskStatus::Pending;
        state.retries = state.retries.saturating_add(1);
        state.started_at = None;
        state.completed_at = None;
        state.result = None;
        true
    }

    /// Terminates a task that never ran (or whose execution blew up) with `error`.
    pub fn force_fail(&self, error: TaskError) -> TaskResult {
        let mut state = self.lock_state();
        if self.is_cancelled() {
            if let Some(result) = state.result.clone() {
                return result;
            }
        }
        let result = TaskResult::failure(error);
        state.status = TaskStatus::Failed;
        state.result = Some(result.clone());
        state.completed_at = Some(Utc::now());
        result
    }

    /// Runs one attempt of the task.
    ///
    /// `input` overrides the configured input when given. The returned result
    /// is also stored on the task. Failures are data: this never panics on a
    /// capability or model error.
    pub async fn execute(&self, input: Option<Value>, services: &Services) -> TaskResult {
        if self.is_cancelled() {
            let result = self.force_fail(TaskError::Cancelled);
            self.persist(services).await;
            return result;
        }

        let acquired = self.in_flight.send_if_modified(|busy| {
            if *busy {
                return false;
            }
            *busy = true;
            true
        });
        if !acquired {
            warn!(task_id = %self.id, "execute called while already running; rejecting");
            return TaskResult::failure(TaskError::AlreadyRunning);
        }
        let _guard = InFlightGuard(&self.in_flight);

        {
            let mut state = self.lock_state();
            state.status = TaskStatus::Running;
            state.started_at = Some(Utc::now());
            state.completed_at = None;
            state.result = None;
        }
        info!(task_id = %self.id, name = %self.name, "task started");
        self.persist(services).await;

        let outcome = self
            .run_body(input.unwrap_or_else(|| self.input.clone()), services)
            .await;

        let result = {
            let mut state = self.lock_state();
            if self.is_cancelled() {
                // cancel() already moved the task to failed; keep that outcome.
                if state.status != TaskStatus::Failed || state.result.is_none() {
                    state.status = TaskStatus::Failed;
                    state.result = Some(TaskResult::failure(TaskError::Cancelled));
                    state.completed_at = Some(Utc::now());
                }
                state
                    .result
                    .clone()
                    .unwrap_or_else(|| TaskResult::failure(TaskError::Cancelled))
            } else {
                let result = match outcome {
                    Ok((output, context)) => TaskResult::success(output, context),
                    Err(err) => TaskResult::failure(err),
                };
                state.status = if result.success {
                    TaskStatus::Completed
                } else {
                    TaskStatus::Failed
                };
                state.result = Some(result.clone());
                state.completed_at = Some(Utc::now());
                result
            }
        };

        match &result.error {
            None => info!(task_id = %self.id, "task completed"),
            Some(err) => warn!(task_id = %self.id, error = %err, "task failed"),
        }
        self.persist(services).await;
        result
    }

    async fn run_body(
        &self,
        input: Value,
        services: &Services,
    ) -> Result<(Value, Option<Map<String, Value>>), TaskError> {
        let session_context = self.load_session_context(services).await;
        let input = match &session_context {
            Some(ctx) => merge_into_input(input, SESSION_CONTEXT_KEY, Value::Object(ctx.clone())),
            None => input,
        };

        let capabilities = self.resolve_capabilities(services).await;
        self.checkpoint()?;

        let output = match (&self.model, capabilities.is_empty()) {
            (Some(model), false) => {
                self.run_model_driven(model, &capabilities, &input, services)
                    .await?
            }
            _ => self.run_sequential(&capabilities, input).await?,
        };
        let output = strip_session_context(output);

        let context = match session_context {
            Some(mut ctx) => {
                ctx.insert(self.name.clone(), output.clone());
                ctx.insert("lastTaskOutput".to_string(), output.clone());
                self.record(
                    services,
                    ContextEntryKind::TaskContext,
                    Value::Object(ctx.clone()),
                )
                .await;
                Some(ctx)
            }
            None => None,
        };

        Ok((output, context))
    }

    async fn run_sequential(
        &self,
        capabilities: &[Arc<dyn Capability>],
        input: Value,
    ) -> Result<Value, TaskError> {
        let mut current = input;
        for cap in capabilities {
            self.checkpoint()?;
            debug!(task_id = %self.id, capability = cap.name(), "invoking capability");
            current = cap
                .execute(current)
                .await
                .map_err(|e| TaskError::Capability {
                    name: cap.name().to_string(),
                    message: e.to_string(),
                })?;
        }
        Ok(current)
    }

    async fn run_model_driven(
        &self,
        model: &Arc<dyn ReasoningModel>,
        capabilities: &[Arc<dyn Capability>],
        input: &Value,
        services: &Services,
    ) -> Result<Value, TaskError> {
        let tools: Vec<ToolSpec> = capabilities
            .iter()
            .map(|cap| ToolSpec::from_capability(cap.as_ref()))
            .collect();

        let mut messages = vec![
            Message::system(AGENT_SYSTEM_MESSAGE),
            Message::user(format!(
                "Task: {}\nDescription: {}\nInput: {}",
                self.name, self.description, input
            )),
        ];
        let options = CompletionOptions {
            tools,
            tool_calling: true,
            system_message: Some(AGENT_SYSTEM_MESSAGE.to_string()),
            ..CompletionOptions::default()
        };

        self.record(
            services,
            ContextEntryKind::ModelRequest,
            json!({ "round": 1, "model": model.name(), "messages": &messages }),
        )
        .await;
        let response = model
            .complete(&messages, &options)
            .await
            .map_err(|e| TaskError::Model(e.to_string()))?;
        let calls = response.tool_calls();
        self.record(
            services,
            ContextEntryKind::ModelResponse,
            json!({ "round": 1, "content": response.content(), "tool_calls": &calls }),
        )
        .await;

        if calls.is_empty() {
            return Ok(Value::String(response.content().to_string()));
        }

        let mut tool_results = Vec::with_capacity(calls.len());
        for call in &calls {
            self.checkpoint()?;
            self.record(
                services,
                ContextEntryKind::ToolCall,
                json!({ "tool": call.name, "arguments": call.arguments }),
            )
            .await;

            let entry = match capabilities.iter().find(|cap| cap.name() == call.name) {
                None => {
                    warn!(task_id = %self.id, tool = %call.name, "model requested unknown tool");
                    json!({ "tool": call.name, "error": "capability not found" })
                }
                Some(cap) => match cap.execute(call.arguments.clone()).await {
                    Ok(value) => json!({ "tool": call.name, "result": value }),
                    Err(e) => {
                        warn!(task_id = %self.id, tool = %call.name, error = %e, "tool call failed");
                        json!({ "tool": call.name, "error": e.to_string() })
                    }
                },
            };

            self.record(services, ContextEntryKind::ToolResult, entry.clone())
                .await;
            tool_results.push(entry);
        }

        messages.push(Message::assistant(response.content()));
        messages.push(Message::tool(Value::Array(tool_results).to_string()));
        messages.push(Message::user(SUMMARY_PROMPT));

        let summary_options = CompletionOptions {
            system_message: Some(AGENT_SYSTEM_MESSAGE.to_string()),
            ..CompletionOptions::default()
        };
        self.record(
            services,
            ContextEntryKind::ModelRequest,
            json!({ "round": 2, "model": model.name(), "messages": &messages }),
        )
        .await;
        let summary = model
            .complete(&messages, &summary_options)
            .await
            .map_err(|e| TaskError::Model(e.to_string()))?;
        self.record(
            services,
            ContextEntryKind::ModelResponse,
            json!({ "round": 2, "content": summary.content() }),
        )
        .await;

        Ok(Value::String(summary.content().to_string()))
    }

    /// Explicit plugin names win; otherwise the selector decides. Neither
    /// source yielding anything is not an error.
    async fn resolve_capabilities(&self, services: &Services) -> Vec<Arc<dyn Capability>> {
        let mut selected: Vec<Arc<dyn Capability>> = Vec::new();

        for name in &self.plugins {
            match services.catalog.get(name) {
                Some(cap) => selected.push(cap),
                None => warn!(task_id = %self.id, capability = %name, "unknown capability; skipping"),
            }
        }

        if selected.is_empty() {
            if let Some(selector) = &services.selector {
                match selector
                    .recognize_intent(
                        &self.name,
                        &self.description,
                        &services.catalog.all(),
                        self.model.as_ref(),
                    )
                    .await
                {
                    Ok(caps) => selected = caps,
                    Err(e) => {
                        warn!(task_id = %self.id, error = %e, "capability selection failed")
                    }
                }
            }
        }

        if selected.is_empty() {
            warn!(task_id = %self.id, "no capabilities selected; proceeding without any");
        }
        selected
    }

    async fn load_session_context(&self, services: &Services) -> Option<Map<String, Value>> {
        let session = self.session_id.as_deref()?;
        let store = services.context_store.as_ref()?;
        match store.get_by_session(session).await {
            Ok(entries) => Some(
                entries
                    .iter()
                    .rev()
                    .find(|e| e.kind == ContextEntryKind::TaskContext)
                    .and_then(|e| e.content.as_object().cloned())
                    .unwrap_or_default(),
            ),
            Err(e) => {
                warn!(task_id = %self.id, session_id = %session, error = %e, "failed to load session context");
                None
            }
        }
    }

    /// Best-effort write to the context side channel.
    async fn record(&self, services: &Services, kind: ContextEntryKind, content: Value) {
        let (Some(store), Some(session)) = (&services.context_store, &self.session_id) else {
            return;
        };
        let entry = ContextEntry::new(session.clone(), Some(self.id.clone()), kind, content);
        if let Err(e) = store.add(entry).await {
            warn!(task_id = %self.id, ?kind, error = %e, "failed to record context entry");
        }
    }

    /// Best-effort write of the durable row.
    pub(crate) async fn persist(&self, services: &Services) {
        let Some(store) = &services.task_store else {
            return;
        };
        if let Err(e) = self.write_record(store.as_ref()).await {
            warn!(task_id = %self.id, store = store.name(), error = %e, "failed to persist task");
        }
    }

    /// Upserts the current row. Writes of one task land in call order and
    /// each one reflects the state at the moment it gets its turn.
    pub(crate) async fn write_record(&self, store: &dyn TaskStore) -> Result<(), StoreError> {
        let _turn = self.write_lock.lock().await;
        upsert(store, &self.to_record()).await
    }

    fn checkpoint(&self) -> Result<(), TaskError> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("status", &state.status)
            .field("retries", &state.retries)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Inserts `key` into an object (or `null`) input. Other input shapes are
/// passed through untouched.
pub(crate) fn merge_into_input(input: Value, key: &str, value: Value) -> Value {
    match input {
        Value::Object(mut map) => {
            map.insert(key.to_string(), value);
            Value::Object(map)
        }
        Value::Null => {
            let mut map = Map::new();
            map.insert(key.to_string(), value);
            Value::Object(map)
        }
        other => {
            debug!(key, "input is not an object; not merging");
            other
        }
    }
}

fn strip_session_context(output: Value) -> Value {
    match output {
        Value::Object(mut map) if map.len() > 1 && map.contains_key(SESSION_CONTEXT_KEY) => {
            map.remove(SESSION_CONTEXT_KEY);
            Value::Object(map)
        }
        other => other,
    }
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityCatalog, ModelResponse, ToolCall};
    use crate::store::{ContextStore, InMemoryContextStore, InMemoryTaskStore, TaskStore};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    struct AddOne;

    #[async_trait]
    impl Capability for AddOne {
        fn name(&self) -> &str {
            "add_one"
        }

        async fn execute(&self, params: Value) -> anyhow::Result<Value> {
            let n = params["n"].as_i64().unwrap_or(0);
            Ok(json!({ "n": n + 1 }))
        }
    }

    struct Failing;

    #[async_trait]
    impl Capability for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn execute(&self, _params: Value) -> anyhow::Result<Value> {
            anyhow::bail!("boom")
        }
    }

    struct CountingCapability {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Capability for CountingCapability {
        fn name(&self) -> &str {
            "counting"
        }

        async fn execute(&self, params: Value) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(params)
        }
    }

    /// Replays canned responses and records the messages it was sent.
    struct ScriptedModel {
        responses: StdMutex<Vec<ModelResponse>>,
        seen: StdMutex<Vec<Vec<Message>>>,
    }

    impl ScriptedModel {
        fn new(mut responses: Vec<ModelResponse>) -> Self {
            responses.reverse();
            Self {
                responses: StdMutex::new(responses),
                seen: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ReasoningModel for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            messages: &[Message],
            _options: &CompletionOptions,
        ) -> anyhow::Result<ModelResponse> {
            self.seen.lock().unwrap().push(messages.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
    }

    fn services_with(caps: Vec<Arc<dyn Capability>>) -> Services {
        Services::new(Arc::new(CapabilityCatalog::with(caps)))
    }

    #[tokio::test]
    async fn sequential_mode_pipes_output_between_capabilities() {
        let services = services_with(vec![Arc::new(AddOne)]);
        let task = Task::new(
            TaskSpec::new("inc")
                .with_plugins(["add_one", "add_one"])
                .with_input(json!({"n": 1})),
            None,
        );

        let result = task.execute(None, &services).await;

        assert!(result.success);
        assert_eq!(result.output, Some(json!({"n": 3})));
        assert_eq!(task.status(), TaskStatus::Completed);
        assert!(task.started_at().is_some());
        assert!(task.completed_at().is_some());
    }

    #[tokio::test]
    async fn explicit_input_overrides_configured_input() {
        let services = services_with(vec![Arc::new(AddOne)]);
        let task = Task::new(
            TaskSpec::new("inc")
                .with_plugins(["add_one"])
                .with_input(json!({"n": 1})),
            None,
        );

        let result = task.execute(Some(json!({"n": 10})), &services).await;
        assert_eq!(result.output, Some(json!({"n": 11})));
    }

    #[tokio::test]
    async fn capability_error_fails_the_task() {
        let services = services_with(vec![Arc::new(Failing), Arc::new(AddOne)]);
        let task = Task::new(TaskSpec::new("t").with_plugins(["failing", "add_one"]), None);

        let result = task.execute(None, &services).await;

        assert!(!result.success);
        assert!(matches!(
            result.error,
            Some(TaskError::Capability { ref name, .. }) if name == "failing"
        ));
        assert_eq!(task.status(), TaskStatus::Failed);
    }

    #[tokio::test]
    async fn no_capabilities_passes_input_through() {
        let services = services_with(vec![]);
        let task = Task::new(
            TaskSpec::new("noop")
                .with_plugins(["missing"])
                .with_input(json!({"v": true})),
            None,
        );

        let result = task.execute(None, &services).await;
        assert!(result.success);
        assert_eq!(result.output, Some(json!({"v": true})));
    }

    #[tokio::test]
    async fn cancel_before_execute_never_reaches_capabilities() {
        let counting = Arc::new(CountingCapability {
            calls: AtomicUsize::new(0),
        });
        let services = services_with(vec![counting.clone()]);
        let task = Task::new(TaskSpec::new("t").with_plugins(["counting"]), None);

        assert!(task.cancel());
        let result = task.execute(None, &services).await;

        assert!(result.is_cancelled());
        assert_eq!(task.status(), TaskStatus::Failed);
        assert!(task.started_at().is_none());
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_after_completion_is_a_no_op() {
        let services = services_with(vec![]);
        let task = Task::new(TaskSpec::new("t"), None);
        task.execute(None, &services).await;

        assert!(!task.cancel());
        assert_eq!(task.status(), TaskStatus::Completed);
    }

    #[tokio::test]
    async fn prepare_retry_resets_failed_task() {
        let services = services_with(vec![Arc::new(Failing)]);
        let task = Task::new(TaskSpec::new("t").with_plugins(["failing"]), None);
        task.execute(None, &services).await;

        assert!(task.prepare_retry());
        assert_eq!(task.status(), TaskStatus::Pending);
        assert_eq!(task.retries(), 1);
        assert!(task.result().is_none());
        assert!(!task.prepare_retry());
    }

    #[tokio::test]
    async fn model_driven_mode_runs_tools_and_summarizes() {
        let model = Arc::new(ScriptedModel::new(vec![
            ModelResponse::Structured {
                content: "calling tools".into(),
                tool_calls: vec![
                    ToolCall {
                        id: Some("c1".into()),
                        name: "add_one".into(),
                        arguments: json!({"n": 41}),
                    },
                    ToolCall {
                        id: Some("c2".into()),
                        name: "ghost".into(),
                        arguments: json!({}),
                    },
                    ToolCall {
                        id: Some("c3".into()),
                        name: "failing".into(),
                        arguments: json!({}),
                    },
                ],
            },
            ModelResponse::Text("the answer is 42".into()),
        ]));
        let context_store = Arc::new(InMemoryContextStore::new());
        let services = services_with(vec![Arc::new(AddOne), Arc::new(Failing)])
            .with_context_store(context_store.clone());
        let task = Task::new(
            TaskSpec::new("answer")
                .with_plugins(["add_one", "failing"])
                .with_session("s1"),
            Some(model.clone()),
        );

        let result = task.execute(None, &services).await;

        assert!(result.success, "tool errors must not abort: {result:?}");
        assert_eq!(result.output, Some(json!("the answer is 42")));

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        let tool_message = &seen[1][3];
        assert_eq!(tool_message.role, crate::capability::Role::Tool);
        assert!(tool_message.content.contains("\"n\":42"));
        assert!(tool_message.content.contains("capability not found"));
        assert!(tool_message.content.contains("boom"));

        let entries = context_store.get_by_session("s1").await.unwrap();
        let tool_calls = entries
            .iter()
            .filter(|e| e.kind == ContextEntryKind::ToolCall)
            .count();
        assert_eq!(tool_calls, 3);
        assert!(entries
            .iter()
            .any(|e| e.kind == ContextEntryKind::TaskContext));
    }

    #[tokio::test]
    async fn model_failure_fails_the_task() {
        let model = Arc::new(ScriptedModel::new(vec![]));
        let services = services_with(vec![Arc::new(AddOne)]);
        let task = Task::new(TaskSpec::new("t").with_plugins(["add_one"]), Some(model));

        let result = task.execute(None, &services).await;
        assert!(matches!(result.error, Some(TaskError::Model(_))));
    }

    #[tokio::test]
    async fn session_context_is_merged_and_written_back() {
        let context_store = Arc::new(InMemoryContextStore::new());
        context_store
            .add(ContextEntry::new(
                "s1",
                None,
                ContextEntryKind::TaskContext,
                json!({"earlier": "value"}),
            ))
            .await
            .unwrap();
        let services = services_with(vec![]).with_context_store(context_store.clone());
        let task = Task::new(
            TaskSpec::new("second")
                .with_session("s1")
                .with_input(json!({"q": 1})),
            None,
        );

        let result = task.execute(None, &services).await;

        // `_context` is stripped from the stored output.
        assert_eq!(result.output, Some(json!({"q": 1})));
        let ctx = result.context.expect("context returned");
        assert_eq!(ctx["earlier"], "value");
        assert_eq!(ctx["second"], json!({"q": 1}));
        assert_eq!(ctx["lastTaskOutput"], json!({"q": 1}));

        let entries = context_store.get_by_session("s1").await.unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn persists_terminal_state() {
        let store = Arc::new(InMemoryTaskStore::new());
        let services = services_with(vec![]).with_task_store(store.clone());
        let task = Task::new(TaskSpec::new("t").with_id("t1"), None);

        task.execute(None, &services).await;

        let row = store.get("t1").await.unwrap().expect("row persisted");
        assert_eq!(row.status, TaskStatus::Completed);
        assert!(row.result.is_some_and(|r| r.success));
    }

    struct Slow;

    #[async_trait]
    impl Capability for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn execute(&self, params: Value) -> anyhow::Result<Value> {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            Ok(params)
        }
    }

    #[tokio::test]
    async fn second_concurrent_execute_is_rejected() {
        let services = services_with(vec![Arc::new(Slow) as Arc<dyn Capability>]);
        let task = Arc::new(Task::new(TaskSpec::new("t").with_plugins(["slow"]), None));

        let first = {
            let task = task.clone();
            let services = services.clone();
            tokio::spawn(async move { task.execute(None, &services).await })
        };
        while !task.is_in_flight() {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }

        let second = task.execute(None, &services).await;
        assert_eq!(second.error, Some(TaskError::AlreadyRunning));
        assert_eq!(task.status(), TaskStatus::Running);

        let idle = task.wait_until_idle().await;
        let first = first.await.unwrap();
        assert!(first.success);
        assert_eq!(idle, Some(first));
        assert!(!task.is_in_flight());
    }

    /// Holds the first `get` long enough for later writes to overtake it.
    struct SlowFirstGet {
        inner: InMemoryTaskStore,
        delayed: AtomicBool,
    }

    #[async_trait]
    impl TaskStore for SlowFirstGet {
        fn name(&self) -> &str {
            "slow-first-get"
        }

        async fn insert(&self, record: &TaskRecord) -> Result<(), StoreError> {
            self.inner.insert(record).await
        }

        async fn update(&self, record: &TaskRecord) -> Result<(), StoreError> {
            self.inner.update(record).await
        }

        async fn get(&self, id: &str) -> Result<Option<TaskRecord>, StoreError> {
            if !self.delayed.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
            self.inner.get(id).await
        }

        async fn list(&self) -> Result<Vec<TaskRecord>, StoreError> {
            self.inner.list().await
        }
    }

    #[tokio::test]
    async fn earlier_write_cannot_overwrite_terminal_row() {
        let store = Arc::new(SlowFirstGet {
            inner: InMemoryTaskStore::new(),
            delayed: AtomicBool::new(false),
        });
        let services = services_with(vec![]).with_task_store(store.clone());
        let task = Arc::new(Task::new(TaskSpec::new("t").with_id("t1"), None));

        let early = {
            let task = task.clone();
            let services = services.clone();
            tokio::spawn(async move { task.persist(&services).await })
        };
        tokio::task::yield_now().await;
        task.execute(None, &services).await;
        early.await.unwrap();

        let row = store.get("t1").await.unwrap().expect("row persisted");
        assert_eq!(row.status, TaskStatus::Completed);
    }

    #[test]
    fn interrupted_running_row_is_restored_as_pending() {
        let task = Task::new(TaskSpec::new("t").with_id("t1"), None);
        let mut record = task.to_record();
        record.status = TaskStatus::Running;
        record.started_at = Some(Utc::now());

        let restored = Task::from_record(record, None);
        assert_eq!(restored.status(), TaskStatus::Pending);
        assert!(restored.started_at().is_none());
        assert_eq!(restored.id(), "t1");
    }

    #[test]
    fn dependencies_are_deduplicated_in_order() {
        let task = Task::new(TaskSpec::new("t").depends_on(["b", "a", "b"]), None);
        assert_eq!(task.dependencies(), &["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn strip_keeps_context_only_objects() {
        assert_eq!(
            strip_session_context(json!({"_context": {}, "x": 1})),
            json!({"x": 1})
        );
        assert_eq!(
            strip_session_context(json!({"_context": {"a": 1}})),
            json!({"_context": {"a": 1}})
        );
    }
}
