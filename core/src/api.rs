//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `taskwave_core::api` instead of reaching into internal modules.

pub use crate::capability::{
    parse_legacy_tool_calls, Capability, CapabilityCatalog, CapabilitySelector,
    CompletionOptions, Message, ModelResponse, ParamSpec, ReasoningModel, Role, ToolCall,
    ToolSpec,
};
pub use crate::config::{
    get_taskwave_data_dir, load_default, load_from_path, AppConfig, LoggingConfig, ManagerConfig,
    OutputConfig, RetryConfig, SchedulerConfig, StoreConfig, StoreKind,
};
pub use crate::context::{Services, ServicesFactory};
pub use crate::error::{CliError, ErrorCode, ExecutorError, StoreError, TaskError};
pub use crate::executor::{
    DependencyResolver, ExecutionResult, OutputRendererPlugin, ProgressMonitor, RenderEvent,
    RetryStrategyPlugin, WaveScheduler, WaveSchedulerBuilder, DEFAULT_CONCURRENCY_LIMIT,
};
pub use crate::manager::TaskManager;
pub use crate::store::{
    upsert, ContextEntry, ContextEntryKind, ContextStore, InMemoryContextStore,
    InMemoryTaskStore, TaskRecord, TaskStore,
};
pub use crate::task::{
    is_empty_value, Task, TaskResult, TaskSpec, TaskStatus, DEPENDENCY_OUTPUTS_KEY,
    SESSION_CONTEXT_KEY,
};
