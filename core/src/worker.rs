//! Single-worker queue processing and the outward task API.
//!
//! One background tokio task executes pipelines strictly sequentially.
//! The in-memory queue is the shared surface between the worker and
//! external callers (submit, delete, edit, maintenance); a single
//! mutex guards it and is never held across an await point. The loop
//! halts itself when no Pending task remains rather than idle-polling.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::StoreError;
use crate::executor::{CancelFlag, PipelineExecutor, RunOutcome};
use crate::generate::Generator;
use crate::plugin::PluginRegistry;
use crate::steps::StepConfigLoader;
use crate::store::TaskStore;
use crate::task::{Task, TaskStatus, TaskType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

pub struct TaskProcessor {
    queue: Mutex<Vec<Task>>,
    store: Arc<TaskStore>,
    configs: Arc<StepConfigLoader>,
    executor: PipelineExecutor,
    cancel: CancelFlag,
    running: AtomicBool,
    delay_between_tasks: Duration,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TaskProcessor {
    /// Build a processor from config: opens the store under
    /// `data_dir`, loads step configs, and reloads the persisted
    /// queue. Tasks found `Processing` or `Retrying` are stale remains
    /// of an interrupted run and are reset to `Pending` (partial
    /// results kept; a re-run starts from step 1 and overwrites them).
    pub fn new(
        cfg: &AppConfig,
        registry: PluginRegistry,
        generator: Arc<dyn Generator>,
    ) -> anyhow::Result<Self> {
        let configs = StepConfigLoader::load(Path::new(&cfg.task_configs_dir))?;
        Self::with_configs(cfg, registry, generator, configs)
    }

    pub fn with_configs(
        cfg: &AppConfig,
        registry: PluginRegistry,
        generator: Arc<dyn Generator>,
        configs: StepConfigLoader,
    ) -> anyhow::Result<Self> {
        let data_dir = crate::config::get_data_dir(cfg);
        std::fs::create_dir_all(&data_dir)?;
        let store = Arc::new(TaskStore::open(
            data_dir.join("task_queue.json"),
            &data_dir.join("tasks.db"),
        )?);

        let mut queue = store.load_queue()?;
        let mut reconciled = 0;
        for task in &mut queue {
            if matches!(task.status, TaskStatus::Processing | TaskStatus::Retrying) {
                task.status = TaskStatus::Pending;
                task.touch();
                reconciled += 1;
            }
        }
        if reconciled > 0 {
            warn!(count = reconciled, "reset interrupted tasks to pending");
            store.save_queue(&queue)?;
        }

        let executor = PipelineExecutor::new(
            Arc::new(registry),
            generator,
            store.clone(),
            Duration::from_millis(cfg.delay_between_steps_ms),
            cfg.max_retries,
        );

        Ok(Self {
            queue: Mutex::new(queue),
            store,
            configs: Arc::new(configs),
            executor,
            cancel: CancelFlag::new(),
            running: AtomicBool::new(false),
            delay_between_tasks: Duration::from_millis(cfg.delay_between_tasks_ms),
            worker: Mutex::new(None),
        })
    }

    // ---- outward API (consumed by the CLI and any route layer) ----

    /// Create and enqueue a task; returns its id. Safe to call while
    /// the worker loop is running.
    pub fn add_task(
        &self,
        task_type: TaskType,
        content: impl Into<String>,
        metadata: IndexMap<String, serde_json::Value>,
    ) -> Result<String, StoreError> {
        self.enqueue(Task::new(task_type, content, metadata))
    }

    /// Enqueue an already-built task (used by file import, which may
    /// override the config name).
    pub fn enqueue(&self, task: Task) -> Result<String, StoreError> {
        let id = task.id.clone();
        self.store.save(&task)?;
        let snapshot = {
            let mut queue = self.lock_queue();
            queue.push(task);
            queue.clone()
        };
        self.store.save_queue(&snapshot)?;
        info!(task_id = %id, "task queued");
        Ok(id)
    }

    pub fn get_stats(&self) -> QueueStats {
        let queue = self.lock_queue();
        QueueStats {
            total: queue.len(),
            pending: count(&queue, TaskStatus::Pending),
            processing: count(&queue, TaskStatus::Processing),
            completed: count(&queue, TaskStatus::Completed),
            failed: count(&queue, TaskStatus::Failed),
        }
    }

    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        self.lock_queue().iter().find(|t| t.id == task_id).cloned()
    }

    pub fn list_tasks(&self) -> Vec<Task> {
        self.lock_queue().clone()
    }

    /// Remove a task regardless of status. A run already in flight for
    /// it finishes but its result is dropped on write-back.
    pub fn delete_task(&self, task_id: &str) -> Result<bool, StoreError> {
        let (removed, snapshot) = {
            let mut queue = self.lock_queue();
            let before = queue.len();
            queue.retain(|t| t.id != task_id);
            (queue.len() < before, queue.clone())
        };
        if removed {
            self.store.save_queue(&snapshot)?;
        }
        Ok(removed)
    }

    /// Edit content and/or metadata; allowed only while Pending.
    pub fn update_task(
        &self,
        task_id: &str,
        content: Option<&str>,
        metadata: Option<IndexMap<String, serde_json::Value>>,
    ) -> Result<bool, StoreError> {
        let (updated, snapshot) = {
            let mut queue = self.lock_queue();
            let Some(task) = queue
                .iter_mut()
                .find(|t| t.id == task_id && t.status == TaskStatus::Pending)
            else {
                return Ok(false);
            };
            if let Some(content) = content {
                task.content = content.to_string();
            }
            if let Some(metadata) = metadata {
                task.metadata = metadata;
            }
            task.touch();
            (task.clone(), queue.clone())
        };
        self.store.save(&updated)?;
        self.store.save_queue(&snapshot)?;
        Ok(true)
    }

    /// Evict completed tasks from the in-memory queue (their rows stay
    /// in the relational log).
    pub fn clear_completed(&self) -> Result<usize, StoreError> {
        self.clear_by_status(TaskStatus::Completed)
    }

    /// Drop tasks that never started.
    pub fn clear_pending(&self) -> Result<usize, StoreError> {
        self.clear_by_status(TaskStatus::Pending)
    }

    /// The only supported manual recovery path: failed tasks return to
    /// Pending with error and retry counter cleared.
    pub fn reset_failed(&self) -> Result<usize, StoreError> {
        let (reset, snapshot) = {
            let mut queue = self.lock_queue();
            let mut reset = 0;
            for task in queue.iter_mut() {
                if task.status == TaskStatus::Failed {
                    task.status = TaskStatus::Pending;
                    task.error = None;
                    task.retry_count = 0;
                    task.touch();
                    reset += 1;
                }
            }
            (reset, queue.clone())
        };
        if reset > 0 {
            self.store.save_queue(&snapshot)?;
        }
        Ok(reset)
    }

    fn clear_by_status(&self, status: TaskStatus) -> Result<usize, StoreError> {
        let (cleared, snapshot) = {
            let mut queue = self.lock_queue();
            let before = queue.len();
            queue.retain(|t| t.status != status);
            (before - queue.len(), queue.clone())
        };
        if cleared > 0 {
            self.store.save_queue(&snapshot)?;
        }
        Ok(cleared)
    }

    // ---- worker loop ----

    /// Spawn the background worker if it is not already running.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.clear();
        let processor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            processor.run_loop().await;
            processor.running.store(false, Ordering::SeqCst);
        });
        *self.worker.lock().expect("worker mutex poisoned") = Some(handle);
    }

    /// Request a cooperative stop: checked between tasks by the loop
    /// and between steps by the executor.
    pub fn stop(&self) {
        self.cancel.set();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Drive the queue to completion in the current task instead of a
    /// background worker (the batch-run entry point).
    pub async fn run_to_completion(self: &Arc<Self>) {
        self.run_loop().await;
    }

    async fn run_loop(&self) {
        info!("worker loop started");
        loop {
            if self.cancel.is_set() {
                info!("worker loop stop requested");
                break;
            }
            let Some(mut task) = self.take_next_pending() else {
                info!("no more pending tasks, worker loop halting");
                break;
            };

            let outcome = match self.configs.steps(&task.config_name) {
                Some(steps) => self.executor.run(&mut task, steps, &self.cancel).await,
                None => {
                    // Retrying cannot fix a missing config; fail now.
                    warn!(task_id = %task.id, config = %task.config_name, "no step configuration");
                    task.status = TaskStatus::Failed;
                    task.error = Some(format!(
                        "no step configuration named '{}'",
                        task.config_name
                    ));
                    task.touch();
                    if let Err(e) = self.store.save(&task) {
                        warn!(task_id = %task.id, "failed to persist task: {e}");
                    }
                    RunOutcome::Failed
                }
            };

            // A retrying task goes straight back to Pending and is
            // re-picked on a later pass of this loop.
            if outcome == RunOutcome::Retrying {
                task.status = TaskStatus::Pending;
            }

            let snapshot = {
                let mut queue = self.lock_queue();
                if let Some(slot) = queue.iter_mut().find(|t| t.id == task.id) {
                    *slot = task;
                }
                // else: deleted while processing; result is dropped.
                queue.clone()
            };
            if let Err(e) = self.store.save_queue(&snapshot) {
                warn!("failed to persist queue snapshot: {e}");
            }

            if outcome == RunOutcome::Cancelled {
                break;
            }
            if !self.delay_between_tasks.is_zero() && !self.cancel.is_set() {
                tokio::time::sleep(self.delay_between_tasks).await;
            }
        }
    }

    fn take_next_pending(&self) -> Option<Task> {
        let mut queue = self.lock_queue();
        let task = queue.iter_mut().find(|t| t.status == TaskStatus::Pending)?;
        task.status = TaskStatus::Processing;
        task.touch();
        Some(task.clone())
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, Vec<Task>> {
        self.queue.lock().expect("queue mutex poisoned")
    }
}

fn count(queue: &[Task], status: TaskStatus) -> usize {
    queue.iter().filter(|t| t.status == status).count()
}
