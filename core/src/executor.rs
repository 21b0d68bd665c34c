//! Per-task pipeline execution.
//!
//! Walks one task through its configured step list, dispatching each
//! step to either a registered plugin or the generative backend,
//! accumulating results in step order, checkpointing after prompt
//! steps, and converting failures into the bounded-retry state
//! machine: Pending -> Processing -> {Completed | Failed | Retrying}.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::error::EngineError;
use crate::generate::Generator;
use crate::plugin::{PluginRegistry, StepContext};
use crate::steps::{StepDescriptor, StepKind};
use crate::store::TaskStore;
use crate::task::{Task, TaskStatus};
use crate::template;

/// Cooperative stop signal, checked between steps and between tasks.
/// Never preemptive: an in-flight backend call runs to completion.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Terminal disposition of one run attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Failed transiently; the task will be re-enqueued as Pending.
    Retrying,
    Failed,
    /// Stop was requested mid-pipeline; the task stays Processing with
    /// partial results and is reconciled on the next startup.
    Cancelled,
}

pub struct PipelineExecutor {
    registry: Arc<PluginRegistry>,
    generator: Arc<dyn Generator>,
    store: Arc<TaskStore>,
    delay_between_steps: Duration,
    max_retries: u32,
}

impl PipelineExecutor {
    pub fn new(
        registry: Arc<PluginRegistry>,
        generator: Arc<dyn Generator>,
        store: Arc<TaskStore>,
        delay_between_steps: Duration,
        max_retries: u32,
    ) -> Self {
        Self {
            registry,
            generator,
            store,
            delay_between_steps,
            max_retries,
        }
    }

    /// Run `task` through `steps`. The task is mutated in place and
    /// its row is persisted on every checkpoint and at end of run; the
    /// caller owns the queue snapshot.
    pub async fn run(
        &self,
        task: &mut Task,
        steps: &[StepDescriptor],
        cancel: &CancelFlag,
    ) -> RunOutcome {
        info!(task_id = %task.id, task_type = %task.task_type, "processing task");
        task.status = TaskStatus::Processing;
        task.touch();
        let start = Instant::now();

        match self.run_steps(task, steps, cancel).await {
            Ok(true) => {
                task.status = TaskStatus::Completed;
                task.error = None;
                task.processing_time = start.elapsed().as_secs_f64();
                task.touch();
                if let Err(e) = self.store.save(task) {
                    error!(task_id = %task.id, "failed to persist completed task: {e}");
                }
                info!(
                    task_id = %task.id,
                    secs = format!("{:.1}", task.processing_time),
                    "task completed"
                );
                RunOutcome::Completed
            }
            Ok(false) => {
                // Cooperative stop between steps: no failure recorded.
                info!(task_id = %task.id, "run cancelled mid-pipeline");
                RunOutcome::Cancelled
            }
            Err(e) => {
                error!(task_id = %task.id, "error processing task: {e}");
                task.error = Some(e.to_string());
                task.retry_count += 1;
                // max_retries bounds retries after the first attempt:
                // with max_retries = 3 the 4th failing attempt is final.
                task.status = if task.retry_count <= self.max_retries {
                    TaskStatus::Retrying
                } else {
                    TaskStatus::Failed
                };
                task.touch();
                if let Err(save_err) = self.store.save(task) {
                    error!(task_id = %task.id, "failed to persist failed task: {save_err}");
                }
                if task.status == TaskStatus::Failed {
                    RunOutcome::Failed
                } else {
                    RunOutcome::Retrying
                }
            }
        }
    }

    /// Ok(true) = all steps done, Ok(false) = cancelled between steps.
    async fn run_steps(
        &self,
        task: &mut Task,
        steps: &[StepDescriptor],
        cancel: &CancelFlag,
    ) -> Result<bool, EngineError> {
        let last = steps.len().saturating_sub(1);
        for (idx, step) in steps.iter().enumerate() {
            if cancel.is_set() {
                return Ok(false);
            }
            info!(task_id = %task.id, step = %step.name, "running step");

            match &step.kind {
                StepKind::Plugin { id, .. } => {
                    let Some(plugin) = self.registry.get(id) else {
                        // Non-fatal: log and continue; a later template
                        // referencing this output resolves to "".
                        warn!(task_id = %task.id, plugin = %id, "plugin not found, skipping step");
                        continue;
                    };
                    let ctx = StepContext {
                        step: step.clone(),
                        previous_results: task.results.clone(),
                    };
                    let value = plugin.execute(task, &ctx).await.map_err(|source| {
                        EngineError::Plugin {
                            name: id.clone(),
                            source,
                        }
                    })?;
                    task.results.insert(step.name.clone(), value);
                    task.touch();
                }
                StepKind::Prompt { template } => {
                    let prompt = template::resolve(template, task);
                    let response = self.generator.generate(&prompt).await?;
                    task.results
                        .insert(step.name.clone(), serde_json::Value::String(response));
                    task.touch();
                    // Prompt calls are the expensive operations; the
                    // row checkpoint makes the result crash-durable.
                    self.store.save(task)?;
                }
            }

            if idx != last && !self.delay_between_steps.is_zero() {
                tokio::time::sleep(self.delay_between_steps).await;
            }
        }
        Ok(true)
    }
}
