//! Durable task state.
//!
//! Two surfaces kept consistent: a whole-queue JSON snapshot (every
//! task, any status, rewritten atomically) and an upsert-style sqlite
//! log keyed by task id. The row upsert is cheap and safe to call
//! after every step; the snapshot rewrite is coarser and happens at
//! minimum after each task's run and on every queue mutation. The
//! snapshot is the recovery mechanism after a crash, so write failures
//! are surfaced, never swallowed.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::info;

use crate::error::StoreError;
use crate::task::{Task, TaskStatus, TaskType};

pub struct TaskStore {
    queue_path: PathBuf,
    conn: Mutex<Connection>,
}

impl TaskStore {
    /// Open (or create) the store: sqlite schema plus snapshot path.
    pub fn open(queue_path: impl Into<PathBuf>, db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                content TEXT NOT NULL,
                config_name TEXT,
                status TEXT NOT NULL,
                results TEXT,
                metadata TEXT,
                error TEXT,
                retry_count INTEGER DEFAULT 0,
                created_at TEXT,
                updated_at TEXT,
                processing_time REAL
            );",
        )?;
        info!(db = %db_path.display(), "task store opened");
        Ok(Self {
            queue_path: queue_path.into(),
            conn: Mutex::new(conn),
        })
    }

    /// Upsert one task row in the relational log.
    pub fn save(&self, task: &Task) -> Result<(), StoreError> {
        let results = serde_json::to_string(&task.results)?;
        let metadata = serde_json::to_string(&task.metadata)?;
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT OR REPLACE INTO tasks
             (id, type, content, config_name, status, results, metadata,
              error, retry_count, created_at, updated_at, processing_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                task.id,
                task.task_type.as_str(),
                task.content,
                task.config_name,
                task.status.as_str(),
                results,
                metadata,
                task.error,
                task.retry_count,
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
                task.processing_time,
            ],
        )?;
        Ok(())
    }

    /// Rewrite the whole queue snapshot. Written to a temp file first
    /// and renamed into place so a crash never leaves a torn snapshot.
    pub fn save_queue(&self, tasks: &[Task]) -> Result<(), StoreError> {
        let body = serde_json::to_string_pretty(tasks)?;
        let tmp = self.queue_path.with_extension("json.tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.queue_path)?;
        Ok(())
    }

    /// Reconstruct the queue from the snapshot. A missing file is an
    /// empty queue; an unrecognized enum value is an error that names
    /// the offending task rather than silently dropping it.
    pub fn load_queue(&self) -> Result<Vec<Task>, StoreError> {
        if !self.queue_path.exists() {
            return Ok(Vec::new());
        }
        let body = std::fs::read_to_string(&self.queue_path)?;
        let raw: Vec<serde_json::Value> = serde_json::from_str(&body)?;

        let mut tasks = Vec::with_capacity(raw.len());
        for entry in raw {
            let task_id = entry
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or("<missing id>")
                .to_string();
            check_variant::<TaskType>(&entry, "type", &task_id)?;
            check_variant::<TaskStatus>(&entry, "status", &task_id)?;
            tasks.push(serde_json::from_value(entry)?);
        }
        info!(count = tasks.len(), "loaded task queue snapshot");
        Ok(tasks)
    }
}

fn check_variant<T: FromStr>(
    entry: &serde_json::Value,
    field: &'static str,
    task_id: &str,
) -> Result<(), StoreError> {
    let value = entry.get(field).and_then(|v| v.as_str()).unwrap_or("");
    if value.parse::<T>().is_err() {
        return Err(StoreError::UnknownVariant {
            field,
            value: value.to_string(),
            task_id: task_id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskType;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn store_in(dir: &Path) -> TaskStore {
        TaskStore::open(dir.join("task_queue.json"), &dir.join("tasks.db")).unwrap()
    }

    fn sample_task() -> Task {
        let mut metadata = IndexMap::new();
        metadata.insert("filename".to_string(), json!("report.md"));
        let mut task = Task::new(TaskType::Search, "rust async runtimes", metadata);
        task.results.insert("web_search".to_string(), json!({"q": "rust"}));
        task.results.insert("summarize".to_string(), json!("summary text"));
        task.status = TaskStatus::Completed;
        task.processing_time = 12.5;
        task
    }

    #[test]
    fn queue_round_trip_is_field_identical() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let task = sample_task();

        store.save_queue(std::slice::from_ref(&task)).unwrap();
        let loaded = store.load_queue().unwrap();
        assert_eq!(loaded.len(), 1);
        let got = &loaded[0];

        assert_eq!(got.id, task.id);
        assert_eq!(got.task_type, task.task_type);
        assert_eq!(got.content, task.content);
        assert_eq!(got.config_name, task.config_name);
        assert_eq!(got.status, task.status);
        assert_eq!(got.results, task.results);
        assert_eq!(got.metadata, task.metadata);
        assert_eq!(got.error, task.error);
        assert_eq!(got.retry_count, task.retry_count);
        assert_eq!(got.created_at, task.created_at);
        assert_eq!(got.updated_at, task.updated_at);
        assert_eq!(got.processing_time, task.processing_time);
    }

    #[test]
    fn results_preserve_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let task = sample_task();

        store.save_queue(std::slice::from_ref(&task)).unwrap();
        let loaded = store.load_queue().unwrap();
        let keys: Vec<_> = loaded[0].results.keys().cloned().collect();
        assert_eq!(keys, vec!["web_search".to_string(), "summarize".to_string()]);
    }

    #[test]
    fn missing_snapshot_is_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(store.load_queue().unwrap().is_empty());
    }

    #[test]
    fn unknown_status_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let mut entry = serde_json::to_value(sample_task()).unwrap();
        entry["status"] = json!("paused");
        std::fs::write(
            dir.path().join("task_queue.json"),
            serde_json::to_string(&[entry]).unwrap(),
        )
        .unwrap();

        let err = store.load_queue().unwrap_err();
        match err {
            StoreError::UnknownVariant { field, value, .. } => {
                assert_eq!(field, "status");
                assert_eq!(value, "paused");
            }
            other => panic!("expected UnknownVariant, got {other}"),
        }
    }

    #[test]
    fn unknown_type_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let mut entry = serde_json::to_value(sample_task()).unwrap();
        entry["type"] = json!("workflow");
        std::fs::write(
            dir.path().join("task_queue.json"),
            serde_json::to_string(&[entry]).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            store.load_queue().unwrap_err(),
            StoreError::UnknownVariant { field: "type", .. }
        ));
    }

    #[test]
    fn save_upserts_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let mut task = sample_task();

        store.save(&task).unwrap();
        task.status = TaskStatus::Failed;
        task.error = Some("boom".to_string());
        store.save(&task).unwrap();

        let conn = store.conn.lock().unwrap();
        let (count, status): (i64, String) = conn
            .query_row(
                "SELECT COUNT(*), MAX(status) FROM tasks WHERE id = ?1",
                params![task.id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(status, "failed");
    }
}
