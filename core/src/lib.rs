//! taskpipe-core: the task pipeline execution engine.
//!
//! Free-form tasks are routed through a named, externally configured
//! sequence of steps — plugin calls or generative-model prompts — by
//! a single background worker, with bounded retry and durable progress
//! (queue snapshot + relational task log) so work resumes after
//! interruption.

pub mod config;
pub mod error;
pub mod executor;
pub mod generate;
pub mod plugin;
pub mod steps;
pub mod store;
pub mod task;
pub mod template;
pub mod worker;

pub use error::{ConfigError, EngineError, StoreError};
pub use executor::{CancelFlag, PipelineExecutor, RunOutcome};
pub use generate::{Generator, OllamaClient};
pub use plugin::{PluginRegistry, StepContext, TaskPlugin};
pub use steps::{StepConfigLoader, StepDescriptor, StepKind};
pub use store::TaskStore;
pub use task::{Task, TaskStatus, TaskType};
pub use worker::{QueueStats, TaskProcessor};
