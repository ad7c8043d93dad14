use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::Services;
use crate::error::TaskError;
use crate::task::{Task, TaskResult};

use super::graph::DependencyResolver;
use super::progress::ProgressMonitor;
use super::traits::{OutputRendererPlugin, RenderEvent, RetryStrategyPlugin};
use super::types::ExecutionResult;

pub const DEFAULT_CONCURRENCY_LIMIT: usize = 5;

/// Runs a run-set in concurrency-bounded waves.
///
/// Each wave is at most `concurrency_limit` tasks taken from the front of a
/// FIFO ready queue. The whole wave is awaited before the next one starts,
/// so one slow task holds back the next wave even when slots are free.
#[derive(Clone)]
pub struct WaveScheduler {
    concurrency_limit: usize,
    retry_strategy: Option<Arc<dyn RetryStrategyPlugin>>,
    renderer: Option<Arc<dyn OutputRendererPlugin>>,
    progress_bar: bool,
}

pub struct WaveSchedulerBuilder {
    concurrency_limit: usize,
    retry_strategy: Option<Arc<dyn RetryStrategyPlugin>>,
    renderer: Option<Arc<dyn OutputRendererPlugin>>,
    progress_bar: bool,
}

impl Default for WaveScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY_LIMIT)
    }
}

impl WaveScheduler {
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            concurrency_limit: concurrency_limit.max(1),
            retry_strategy: None,
            renderer: None,
            progress_bar: false,
        }
    }

    pub fn builder() -> WaveSchedulerBuilder {
        WaveSchedulerBuilder::new()
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    /// Executes `tasks` and returns one result per distinct task.
    ///
    /// `known` is the manager's registry; dependencies outside it are ignored.
    /// Never fails: task errors, panics and unresolved dependencies all end
    /// up as failed entries in the report.
    pub async fn run(
        &self,
        tasks: Vec<Arc<Task>>,
        known: &HashMap<String, Arc<Task>>,
        services: Arc<Services>,
    ) -> ExecutionResult {
        let start = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let mut resolver = DependencyResolver::new(&tasks, known);
        let total_tasks = resolver.len();

        if let Some(cycle) = resolver.detect_cycle() {
            warn!(run_id = %run_id, cycle = %cycle, "dependency cycle detected; affected tasks will fail as unresolved");
        }

        self.emit(RenderEvent::RunStart {
            run_id: run_id.clone(),
            total_tasks,
            concurrency_limit: self.concurrency_limit,
        });

        let progress = Arc::new(Mutex::new(ProgressMonitor::new(
            total_tasks,
            self.progress_bar,
        )));

        let mut ready: VecDeque<String> = resolver.initial_ready().into();
        let mut results: HashMap<String, TaskResult> = HashMap::with_capacity(total_tasks);
        let mut waves: Vec<Vec<String>> = Vec::new();

        while !ready.is_empty() {
            let take = self.concurrency_limit.min(ready.len());
            let wave: Vec<String> = ready.drain(..take).collect();
            let wave_id = waves.len();

            debug!(run_id = %run_id, wave_id, tasks = ?wave, "wave start");
            self.emit(RenderEvent::WaveStart {
                run_id: run_id.clone(),
                wave_id,
                task_ids: wave.clone(),
            });
            if let Ok(monitor) = progress.lock() {
                monitor.update_wave(wave_id, wave.len());
            }

            let wave_results = self
                .execute_wave(
                    &run_id,
                    wave_id,
                    &wave,
                    &resolver,
                    &results,
                    &services,
                    &progress,
                )
                .await;
            results.extend(wave_results);

            for id in &wave {
                ready.extend(resolver.on_finished(id));
            }

            self.emit(RenderEvent::WaveEnd {
                run_id: run_id.clone(),
                wave_id,
            });
            waves.push(wave);
        }

        for (task_id, pending) in resolver.unresolved() {
            let Some(task) = resolver.task(&task_id) else {
                continue;
            };
            warn!(run_id = %run_id, task_id = %task_id, pending = ?pending, "task has unresolved dependencies");
            let result = task.force_fail(TaskError::UnresolvedDependencies {
                pending: pending.clone(),
            });
            task.persist(&services).await;

            if let Ok(monitor) = progress.lock() {
                monitor.skip_task();
            }
            self.emit(RenderEvent::Unresolved {
                run_id: run_id.clone(),
                task_id: task_id.clone(),
                pending,
            });
            results.insert(task_id, result);
        }

        let succeeded = results.values().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        let report = ExecutionResult {
            run_id: run_id.clone(),
            total_tasks,
            succeeded,
            failed,
            duration_ms: start.elapsed().as_millis() as u64,
            waves,
            task_results: results,
        };

        if let Ok(monitor) = progress.lock() {
            monitor.finish(report.all_succeeded());
        }
        info!(
            run_id = %run_id,
            total = report.total_tasks,
            succeeded = report.succeeded,
            failed = report.failed,
            waves = report.waves.len(),
            duration_ms = report.duration_ms,
            "run finished"
        );
        self.emit(RenderEvent::RunEnd {
            run_id,
            result: report.clone(),
        });

        report
    }

    /// Runs one wave to completion; a panicking task is recorded as failed.
    #[allow(clippy::too_many_arguments)]
    async fn execute_wave(
        &self,
        run_id: &str,
        wave_id: usize,
        wave: &[String],
        resolver: &DependencyResolver,
        prev_results: &HashMap<String, TaskResult>,
        services: &Arc<Services>,
        progress: &Arc<Mutex<ProgressMonitor>>,
    ) -> HashMap<String, TaskResult> {
        // A wave never holds more than `concurrency_limit` tasks and retries
        // stay inside their task's future, so the wave itself is the bound.
        let mut futs = FuturesUnordered::new();

        if let Ok(mut monitor) = progress.lock() {
            for task_id in wave {
                monitor.add_task(task_id);
            }
        }

        for task_id in wave {
            let Some(task) = resolver.task(task_id).cloned() else {
                continue;
            };
            let attempt_ctx = AttemptContext {
                run_id: run_id.to_string(),
                wave_id,
                input: resolver.build_input(task_id, prev_results),
                services: services.clone(),
                retry_strategy: self.retry_strategy.clone(),
                renderer: self.renderer.clone(),
                progress: progress.clone(),
            };
            let spawned = task.clone();
            let handle =
                tokio::spawn(async move { attempt_ctx.run_with_retries(&spawned).await });

            futs.push(async move { (task, handle.await) });
        }

        let mut results = HashMap::with_capacity(wave.len());
        while let Some((task, joined)) = futs.next().await {
            let result = match joined {
                Ok(result) => result,
                Err(join_err) => {
                    warn!(run_id = %run_id, task_id = task.id(), error = %join_err, "task execution panicked");
                    let result = task.force_fail(TaskError::Panicked(join_err.to_string()));
                    task.persist(services).await;
                    if let Ok(mut monitor) = progress.lock() {
                        monitor.complete_task(task.id(), false, 0);
                    }
                    self.emit(RenderEvent::TaskComplete {
                        run_id: run_id.to_string(),
                        task_id: task.id().to_string(),
                        result: result.clone(),
                        duration_ms: 0,
                        retries: task.retries(),
                    });
                    result
                }
            };
            results.insert(task.id().to_string(), result);
        }

        results
    }

    fn emit(&self, event: RenderEvent) {
        emit_event(&self.renderer, event);
    }
}

/// Everything a spawned task attempt needs, owned so it can cross `tokio::spawn`.
struct AttemptContext {
    run_id: String,
    wave_id: usize,
    input: Option<Value>,
    services: Arc<Services>,
    retry_strategy: Option<Arc<dyn RetryStrategyPlugin>>,
    renderer: Option<Arc<dyn OutputRendererPlugin>>,
    progress: Arc<Mutex<ProgressMonitor>>,
}

impl AttemptContext {
    /// Up to `max_retries + 1` attempts; the retry strategy may veto earlier.
    async fn run_with_retries(&self, task: &Task) -> TaskResult {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        let result = loop {
            emit_event(
                &self.renderer,
                RenderEvent::TaskStart {
                    run_id: self.run_id.clone(),
                    task_id: task.id().to_string(),
                    wave_id: self.wave_id,
                    attempt,
                },
            );

            let result = task.execute(self.input.clone(), &self.services).await;
            if matches!(result.error, Some(TaskError::AlreadyRunning)) {
                // Another caller owns this execution; its outcome is this task's outcome.
                debug!(task_id = task.id(), "task is running elsewhere; waiting for it");
                break task.wait_until_idle().await.unwrap_or(result);
            }
            if result.success || task.is_cancelled() {
                break result;
            }

            let error = result
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            if result.error.as_ref().is_some_and(TaskError::is_fatal) {
                break result;
            }

            attempt += 1;
            if attempt > task.max_retries() {
                break result;
            }

            let Some(delay) = self.retry_delay(attempt, &error) else {
                debug!(task_id = task.id(), attempt, "retry vetoed by strategy");
                break result;
            };
            if !task.prepare_retry() {
                break result;
            }

            info!(
                task_id = task.id(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying task"
            );
            emit_event(
                &self.renderer,
                RenderEvent::TaskRetry {
                    run_id: self.run_id.clone(),
                    task_id: task.id().to_string(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                    error,
                },
            );
            if let Ok(monitor) = self.progress.lock() {
                monitor.retry_task(task.id(), attempt);
            }

            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        if let Ok(mut monitor) = self.progress.lock() {
            monitor.complete_task(task.id(), result.success, duration_ms);
        }
        emit_event(
            &self.renderer,
            RenderEvent::TaskComplete {
                run_id: self.run_id.clone(),
                task_id: task.id().to_string(),
                result: result.clone(),
                duration_ms,
                retries: task.retries(),
            },
        );

        result
    }

    /// `None` stops retrying. Without a strategy retries are immediate.
    fn retry_delay(&self, attempt: u32, error: &str) -> Option<Duration> {
        match &self.retry_strategy {
            None => Some(Duration::ZERO),
            Some(strategy) => {
                if !strategy.should_retry(attempt, error) {
                    return None;
                }
                strategy.next_delay(attempt, error)
            }
        }
    }
}

fn emit_event(renderer: &Option<Arc<dyn OutputRendererPlugin>>, event: RenderEvent) {
    if let Some(renderer) = renderer {
        renderer.render(&event);
    }
}

impl WaveSchedulerBuilder {
    pub fn new() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            retry_strategy: None,
            renderer: None,
            progress_bar: false,
        }
    }

    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit.max(1);
        self
    }

    pub fn retry_strategy(mut self, strategy: Arc<dyn RetryStrategyPlugin>) -> Self {
        self.retry_strategy = Some(strategy);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn OutputRendererPlugin>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn progress_bar(mut self, enabled: bool) -> Self {
        self.progress_bar = enabled;
        self
    }

    pub fn build(self) -> WaveScheduler {
        WaveScheduler {
            concurrency_limit: self.concurrency_limit,
            retry_strategy: self.retry_strategy,
            renderer: self.renderer,
            progress_bar: self.progress_bar,
        }
    }
}

impl Default for WaveSchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
