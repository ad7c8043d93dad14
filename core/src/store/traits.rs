use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

use super::record::TaskRecord;

#[async_trait]
pub trait TaskStore: Send + Sync {
    fn name(&self) -> &str;

    /// Inserts a new row; fails with [`StoreError::UniqueViolation`] if the id exists.
    async fn insert(&self, record: &TaskRecord) -> Result<(), StoreError>;

    /// Replaces an existing row; fails with [`StoreError::NotFound`] if absent.
    async fn update(&self, record: &TaskRecord) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<TaskRecord>, StoreError>;

    async fn list(&self) -> Result<Vec<TaskRecord>, StoreError>;
}

/// Insert if absent, update otherwise.
///
/// A concurrent writer can insert the same id between the lookup and the
/// insert; that unique violation is retried as an update.
pub async fn upsert(store: &dyn TaskStore, record: &TaskRecord) -> Result<(), StoreError> {
    if store.get(&record.id).await?.is_some() {
        return store.update(record).await;
    }
    match store.insert(record).await {
        Err(StoreError::UniqueViolation(id)) => {
            tracing::debug!(task_id = %id, store = store.name(), "insert raced; falling back to update");
            store.update(record).await
        }
        other => other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextEntryKind {
    /// Accumulated session context (`{taskName: output, lastTaskOutput}`).
    TaskContext,
    ModelRequest,
    ModelResponse,
    ToolCall,
    ToolResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    #[serde(default)]
    pub id: Option<String>,
    pub session_id: String,
    #[serde(default)]
    pub task_id: Option<String>,
    pub kind: ContextEntryKind,
    pub content: Value,
    pub created_at: DateTime<Utc>,
}

impl ContextEntry {
    pub fn new(
        session_id: impl Into<String>,
        task_id: Option<String>,
        kind: ContextEntryKind,
        content: Value,
    ) -> Self {
        Self {
            id: None,
            session_id: session_id.into(),
            task_id,
            kind,
            content,
            created_at: Utc::now(),
        }
    }
}

/// Session-scoped memory used for task context and audit entries.
#[async_trait]
pub trait ContextStore: Send + Sync {
    fn name(&self) -> &str;

    /// Appends an entry and returns its id.
    async fn add(&self, entry: ContextEntry) -> Result<String, StoreError>;

    /// Entries of a session in insertion order.
    async fn get_by_session(&self, session_id: &str) -> Result<Vec<ContextEntry>, StoreError>;
}
