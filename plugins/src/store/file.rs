use std::path::{Path, PathBuf};

use async_trait::async_trait;
use taskwave_core::api::{ContextEntry, ContextStore, StoreError, TaskRecord, TaskStore};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Task rows kept as a pretty-printed JSON array in one file.
///
/// The file is read on first use and rewritten after every change
/// (write to a sibling temp file, then rename).
pub struct JsonFileTaskStore {
    path: PathBuf,
    rows: Mutex<Option<Vec<TaskRecord>>>,
}

impl JsonFileTaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            rows: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_rows(path: &Path) -> Result<Vec<TaskRecord>, StoreError> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) if text.trim().is_empty() => Ok(Vec::new()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_rows(&self, rows: &[TaskRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(rows)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Runs `f` against the loaded rows, persisting when it returns `Ok(true)`.
    async fn with_rows<T>(
        &self,
        f: impl FnOnce(&mut Vec<TaskRecord>) -> Result<(T, bool), StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.rows.lock().await;
        if guard.is_none() {
            *guard = Some(Self::read_rows(&self.path).await?);
        }
        let cached = guard.get_or_insert_with(Vec::new);
        // Edits go to a copy; the cache only changes once the file does.
        let mut rows = cached.clone();
        let (value, dirty) = f(&mut rows)?;
        if dirty {
            self.write_rows(&rows).await?;
            *cached = rows;
        }
        Ok(value)
    }
}

#[async_trait]
impl TaskStore for JsonFileTaskStore {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn insert(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.with_rows(|rows| {
            if rows.iter().any(|r| r.id == record.id) {
                return Err(StoreError::UniqueViolation(record.id.clone()));
            }
            rows.push(record.clone());
            Ok(((), true))
        })
        .await
    }

    async fn update(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.with_rows(|rows| match rows.iter_mut().find(|r| r.id == record.id) {
            Some(row) => {
                *row = record.clone();
                Ok(((), true))
            }
            None => Err(StoreError::NotFound(record.id.clone())),
        })
        .await
    }

    async fn get(&self, id: &str) -> Result<Option<TaskRecord>, StoreError> {
        self.with_rows(|rows| Ok((rows.iter().find(|r| r.id == id).cloned(), false)))
            .await
    }

    async fn list(&self) -> Result<Vec<TaskRecord>, StoreError> {
        self.with_rows(|rows| Ok((rows.clone(), false))).await
    }
}

/// Context entries appended one JSON object per line.
pub struct JsonlContextStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlContextStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ContextStore for JsonlContextStore {
    fn name(&self) -> &str {
        "jsonl-file"
    }

    async fn add(&self, mut entry: ContextEntry) -> Result<String, StoreError> {
        let id = entry
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        entry.id = Some(id.clone());

        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(id)
    }

    async fn get_by_session(&self, session_id: &str) -> Result<Vec<ContextEntry>, StoreError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ContextEntry>(line) {
                Ok(entry) if entry.session_id == session_id => entries.push(entry),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), line = idx + 1, error = %e, "skipping malformed context entry")
                }
            }
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use taskwave_core::api::{upsert, ContextEntryKind, Task, TaskSpec, TaskStatus};

    #[tokio::test]
    async fn task_rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/tasks.json");

        let store = JsonFileTaskStore::new(&path);
        let task = Task::new(TaskSpec::new("a").with_id("a"), None);
        upsert(&store, &task.to_record()).await.unwrap();
        assert!(matches!(
            store.insert(&task.to_record()).await,
            Err(StoreError::UniqueViolation(_))
        ));

        let mut done = task.to_record();
        done.status = TaskStatus::Completed;
        upsert(&store, &done).await.unwrap();

        let reopened = JsonFileTaskStore::new(&path);
        let rows = reopened.list().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileTaskStore::new(dir.path().join("tasks.json"));
        let task = Task::new(TaskSpec::new("a"), None);

        assert!(matches!(
            store.update(&task.to_record()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn failed_write_leaves_cached_rows_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let store = JsonFileTaskStore::new(&path);

        let a = Task::new(TaskSpec::new("a").with_id("a"), None);
        store.insert(&a.to_record()).await.unwrap();

        // A directory where the temp file goes makes the next write fail.
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap();
        let b = Task::new(TaskSpec::new("b").with_id("b"), None);
        assert!(store.insert(&b.to_record()).await.is_err());

        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a".to_string()]);
        assert!(store.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn context_entries_are_scoped_by_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlContextStore::new(dir.path().join("ctx.jsonl"));

        let id = store
            .add(ContextEntry::new("s1", None, ContextEntryKind::TaskContext, json!({"a": 1})))
            .await
            .unwrap();
        store
            .add(ContextEntry::new("s2", None, ContextEntryKind::TaskContext, json!({"b": 2})))
            .await
            .unwrap();

        let entries = store.get_by_session("s1").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id.as_deref(), Some(id.as_str()));
        assert_eq!(entries[0].content, json!({"a": 1}));
        assert!(store.get_by_session("nobody").await.unwrap().is_empty());
    }
}
