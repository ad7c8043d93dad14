//! Durable task rows and the session context side channel.
//!
//! Both are best-effort from the scheduler's point of view: failures are
//! logged where they occur and never change a task's outcome.

mod memory;
mod record;
mod traits;

pub use memory::{InMemoryContextStore, InMemoryTaskStore};
pub use record::TaskRecord;
pub use traits::{upsert, ContextEntry, ContextEntryKind, ContextStore, TaskStore};
