//! Dependency-graph execution for a run-set of tasks.
//!
//! # Architecture
//!
//! ```text
//! Vec<Arc<Task>> + manager registry
//!   ↓
//! DependencyResolver::new() → edges, reverse_edges (unknown deps dropped)
//!   ↓
//! DependencyResolver::initial_ready() → FIFO ready queue
//!   ↓
//! WaveScheduler::run()
//!   loop: take ≤ N ready → execute wave (retries inside) → on_finished() → enqueue
//!   ↓
//! DependencyResolver::unresolved() → failed with UnresolvedDependencies
//!   ↓
//! ExecutionResult
//! ```

mod graph;
mod progress;
mod scheduler;
pub mod traits;
pub mod types;

pub use graph::DependencyResolver;
pub use progress::ProgressMonitor;
pub use scheduler::{WaveScheduler, WaveSchedulerBuilder, DEFAULT_CONCURRENCY_LIMIT};
pub use traits::{OutputRendererPlugin, RenderEvent, RetryStrategyPlugin};
pub use types::ExecutionResult;
