use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;

use super::record::TaskRecord;
use super::traits::{ContextEntry, ContextStore, TaskStore};

/// Process-local task rows. Durability ends with the process.
#[derive(Default)]
pub struct InMemoryTaskStore {
    rows: RwLock<HashMap<String, TaskRecord>>,
    order: RwLock<Vec<String>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&record.id) {
            return Err(StoreError::UniqueViolation(record.id.clone()));
        }
        rows.insert(record.id.clone(), record.clone());
        self.order.write().await.push(record.id.clone());
        Ok(())
    }

    async fn update(&self, record: &TaskRecord) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(&record.id) {
            Some(row) => {
                *row = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(record.id.clone())),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<TaskRecord>, StoreError> {
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let rows = self.rows.read().await;
        let order = self.order.read().await;
        Ok(order.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }
}

#[derive(Default)]
pub struct InMemoryContextStore {
    entries: RwLock<Vec<ContextEntry>>,
}

impl InMemoryContextStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContextStore for InMemoryContextStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn add(&self, mut entry: ContextEntry) -> Result<String, StoreError> {
        let id = entry
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        entry.id = Some(id.clone());
        self.entries.write().await.push(entry);
        Ok(id)
    }

    async fn get_by_session(&self, session_id: &str) -> Result<Vec<ContextEntry>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect())
    }
}
