#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use taskwave_core::api::{
    Capability, CapabilityCatalog, ManagerConfig, OutputRendererPlugin, RenderEvent, Services,
    TaskManager, WaveScheduler,
};

/// Shared, ordered log of `start:<name>` / `end:<name>` markers.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> usize {
        self.entries()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("missing log entry {entry}"))
    }
}

/// Returns a fixed output and remembers every input it was given.
pub struct RecordingCapability {
    name: String,
    output: Value,
    delay: Duration,
    log: EventLog,
    pub seen: Mutex<Vec<Value>>,
}

impl RecordingCapability {
    pub fn new(name: &str, output: Value, log: &EventLog) -> Arc<Self> {
        Self::with_delay(name, output, log, Duration::from_millis(5))
    }

    pub fn with_delay(name: &str, output: Value, log: &EventLog, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            output,
            delay,
            log: log.clone(),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn last_input(&self) -> Value {
        self.seen.lock().unwrap().last().cloned().unwrap_or(Value::Null)
    }
}

#[async_trait]
impl Capability for RecordingCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value> {
        self.log.push(format!("start:{}", self.name));
        self.seen.lock().unwrap().push(params);
        tokio::time::sleep(self.delay).await;
        self.log.push(format!("end:{}", self.name));
        Ok(self.output.clone())
    }
}

/// Always fails.
pub struct FailingCapability(pub &'static str);

#[async_trait]
impl Capability for FailingCapability {
    fn name(&self) -> &str {
        self.0
    }

    async fn execute(&self, _params: Value) -> anyhow::Result<Value> {
        anyhow::bail!("{} is broken", self.0)
    }
}

/// Fails the first `failures` calls, then succeeds.
pub struct FlakyCapability {
    remaining_failures: AtomicU32,
    pub calls: AtomicU32,
}

impl FlakyCapability {
    pub fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            remaining_failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl Capability for FlakyCapability {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn execute(&self, _params: Value) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.remaining_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.remaining_failures.store(left - 1, Ordering::SeqCst);
            anyhow::bail!("transient failure");
        }
        Ok(json!({"ok": true}))
    }
}

/// Tracks how many executions overlap.
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    pub max_seen: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            current: AtomicUsize::new(0),
            max_seen: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Capability for ConcurrencyGauge {
    fn name(&self) -> &str {
        "gauge"
    }

    async fn execute(&self, params: Value) -> anyhow::Result<Value> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(params)
    }
}

pub struct PanickingCapability;

#[async_trait]
impl Capability for PanickingCapability {
    fn name(&self) -> &str {
        "panics"
    }

    async fn execute(&self, _params: Value) -> anyhow::Result<Value> {
        panic!("capability blew up");
    }
}

/// Collects every render event.
#[derive(Default)]
pub struct CollectingRenderer {
    pub events: Mutex<Vec<RenderEvent>>,
}

impl OutputRendererPlugin for CollectingRenderer {
    fn name(&self) -> &str {
        "collect"
    }

    fn format(&self) -> &str {
        "memory"
    }

    fn render(&self, event: &RenderEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Routes `tracing` output through the test harness; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("taskwave_core=debug")
        .try_init();
}

pub fn services(capabilities: Vec<Arc<dyn Capability>>) -> Services {
    Services::new(Arc::new(CapabilityCatalog::with(capabilities)))
}

pub fn manager(capabilities: Vec<Arc<dyn Capability>>, concurrency: usize) -> TaskManager {
    TaskManager::new(
        services(capabilities),
        WaveScheduler::new(concurrency),
        ManagerConfig::default(),
    )
}
