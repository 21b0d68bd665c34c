use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of task kinds. The kind selects which step configuration
/// applies unless the task carries an explicit `config_name` override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Search,
    Process,
    Create,
    Code,
    Chain,
    Custom,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Process => "process",
            Self::Create => "create",
            Self::Code => "code",
            Self::Chain => "chain",
            Self::Custom => "custom",
        }
    }

    /// Name of the step-config list this task type loads by default.
    pub fn default_config_name(&self) -> String {
        format!("{}_tasks", self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(Self::Search),
            "process" => Ok(Self::Process),
            "create" => Ok(Self::Create),
            "code" => Ok(Self::Code),
            "chain" => Ok(Self::Chain),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown task type '{other}'")),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state. Transitions only through the executor's state
/// machine: Pending -> Processing -> {Completed | Failed | Retrying},
/// Retrying -> Pending until retries are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retrying,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
        }
    }

    /// Completed and Failed are terminal for a given run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "retrying" => Ok(Self::Retrying),
            other => Err(format!("unknown task status '{other}'")),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work tracked through the pipeline.
///
/// `results` is insertion-ordered: its keys are exactly the names of
/// the steps that have completed so far, in execution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub content: String,
    pub config_name: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub results: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub metadata: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Wall-clock seconds consumed by the most recent completed run.
    #[serde(default)]
    pub processing_time: f64,
}

impl Task {
    pub fn new(
        task_type: TaskType,
        content: impl Into<String>,
        metadata: IndexMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: format!("{}_{}", task_type.as_str(), Uuid::new_v4().simple()),
            task_type,
            content: content.into(),
            config_name: task_type.default_config_name(),
            status: TaskStatus::Pending,
            results: IndexMap::new(),
            metadata,
            error: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
            processing_time: 0.0,
        }
    }

    pub fn with_config_name(mut self, config_name: impl Into<String>) -> Self {
        self.config_name = config_name.into();
        self
    }

    /// Refresh `updated_at`; called on every mutation.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_type_round_trips_through_str() {
        for t in [
            TaskType::Search,
            TaskType::Process,
            TaskType::Create,
            TaskType::Code,
            TaskType::Chain,
            TaskType::Custom,
        ] {
            assert_eq!(t.as_str().parse::<TaskType>().unwrap(), t);
        }
        assert!("workflow".parse::<TaskType>().is_err());
    }

    #[test]
    fn status_terminality() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Retrying.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
    }

    #[test]
    fn new_task_defaults() {
        let task = Task::new(TaskType::Process, "improve this", IndexMap::new());
        assert!(task.id.starts_with("process_"));
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.config_name, "process_tasks");
        assert!(task.results.is_empty());
        assert_eq!(task.retry_count, 0);
        assert!(task.error.is_none());
    }

    #[test]
    fn ids_are_unique() {
        let a = Task::new(TaskType::Custom, "a", IndexMap::new());
        let b = Task::new(TaskType::Custom, "a", IndexMap::new());
        assert_ne!(a.id, b.id);
    }
}
