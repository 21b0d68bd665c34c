use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "taskpipe", about = "Queue tasks and run them through configured pipelines")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Queue a single task.
    Add(AddArgs),
    /// Import tasks from a marker-delimited text file.
    AddFile(AddFileArgs),
    /// Process the queue to completion.
    Run,
    /// Show queue statistics.
    Status,
    /// Remove completed tasks from the queue (their history rows remain).
    Clear(ClearArgs),
    /// Return failed tasks to pending with their retry counters cleared.
    ResetFailed,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AddArgs {
    /// Task type: search, process, create, code, chain or custom.
    pub task_type: String,

    /// Free-form task content.
    pub content: String,

    /// Metadata entries as key=value, repeatable.
    #[arg(long = "meta", value_name = "KEY=VALUE")]
    pub meta: Vec<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AddFileArgs {
    /// Path to a task file. Each task starts with a `{type}` marker;
    /// an unknown marker falls back to the custom type. Content may
    /// carry a `key=value,key=value::` metadata prefix.
    pub path: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ClearArgs {
    /// Also drop tasks that never started.
    #[arg(long)]
    pub all: bool,
}
