use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use tracing::info;

use taskpipe_core::generate::{Generator, OllamaClient};
use taskpipe_core::task::{TaskStatus, TaskType};
use taskpipe_core::worker::TaskProcessor;

mod commands;
mod error;

use commands::{cli, import};
use error::CliError;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg =
        taskpipe_core::config::load_default().map_err(|e| CliError::Config(e.to_string()))?;
    init_tracing(&cfg.logging).map_err(CliError::Command)?;

    let registry = taskpipe_plugins::default_registry(&cfg)?;
    let generator: Arc<dyn Generator> = Arc::new(OllamaClient::new(&cfg));
    let processor = Arc::new(TaskProcessor::new(&cfg, registry, generator)?);

    dispatch(args.command, processor).await
}

fn exit_code_for_error(e: &CliError) -> i32 {
    // 0: success
    // 11: config error
    // 20: usage / IO error
    // 50: internal/uncategorized
    match e {
        CliError::Config(_) => 11,
        CliError::Command(_) => 20,
        CliError::Io(_) => 20,
        CliError::Store(_) => 50,
        CliError::Anyhow(_) => 50,
    }
}

async fn dispatch(cmd: cli::Commands, processor: Arc<TaskProcessor>) -> Result<i32, CliError> {
    match cmd {
        cli::Commands::Add(add) => {
            let task_type = TaskType::from_str(&add.task_type).map_err(CliError::Command)?;
            let metadata = parse_meta_pairs(&add.meta)?;
            let id = processor.add_task(task_type, add.content, metadata)?;
            println!("queued {id}");
            Ok(0)
        }
        cli::Commands::AddFile(file) => {
            let text = std::fs::read_to_string(&file.path)?;
            let tasks = import::parse_task_file(&text);
            if tasks.is_empty() {
                println!("no tasks found in {}", file.path.display());
                return Ok(0);
            }
            let count = tasks.len();
            for task in tasks {
                processor.enqueue(task)?;
            }
            println!("queued {count} tasks from {}", file.path.display());
            Ok(0)
        }
        cli::Commands::Run => run_queue(processor).await,
        cli::Commands::Status => {
            print_status(&processor);
            Ok(0)
        }
        cli::Commands::Clear(clear) => {
            let completed = processor.clear_completed()?;
            println!("cleared {completed} completed tasks");
            if clear.all {
                let pending = processor.clear_pending()?;
                println!("cleared {pending} pending tasks");
            }
            Ok(0)
        }
        cli::Commands::ResetFailed => {
            let reset = processor.reset_failed()?;
            println!("reset {reset} failed tasks to pending");
            Ok(0)
        }
    }
}

/// Drive the queue to completion, drawing one progress line. Ctrl-C
/// requests a cooperative stop; in-memory state stays consistent and
/// the interrupted task is reset to pending on the next startup.
async fn run_queue(processor: Arc<TaskProcessor>) -> Result<i32, CliError> {
    let start_stats = processor.get_stats();
    if start_stats.pending == 0 {
        println!("queue is empty, nothing to run");
        return Ok(0);
    }

    let bar = ProgressBar::new(start_stats.pending as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .map_err(|e| CliError::Command(e.to_string()))?
            .progress_chars("=> "),
    );

    let stopper = Arc::clone(&processor);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stopper.stop();
        }
    });

    let done_at_start = start_stats.completed + start_stats.failed;
    info!(pending = start_stats.pending, "processing queue");
    processor.start();
    loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let stats = processor.get_stats();
        bar.set_position((stats.completed + stats.failed - done_at_start) as u64);
        if let Some(current) = processor
            .list_tasks()
            .iter()
            .find(|t| t.status == TaskStatus::Processing)
        {
            bar.set_message(current.id.clone());
        }
        if !processor.is_running() {
            break;
        }
    }
    bar.finish_with_message("done");

    let stats = processor.get_stats();
    println!(
        "completed: {}  failed: {}  pending: {}",
        stats.completed, stats.failed, stats.pending
    );
    Ok(0)
}

fn print_status(processor: &Arc<TaskProcessor>) {
    let stats = processor.get_stats();
    println!("total:      {}", stats.total);
    println!("pending:    {}", stats.pending);
    println!("processing: {}", stats.processing);
    println!("completed:  {}", stats.completed);
    println!("failed:     {}", stats.failed);

    let tasks = processor.list_tasks();
    if tasks.is_empty() {
        return;
    }
    let mut by_type: IndexMap<TaskType, usize> = IndexMap::new();
    for task in &tasks {
        *by_type.entry(task.task_type).or_insert(0) += 1;
    }
    println!("by type:");
    for (task_type, count) in &by_type {
        println!("  {task_type}: {count}");
    }
}

fn parse_meta_pairs(pairs: &[String]) -> Result<IndexMap<String, serde_json::Value>, CliError> {
    let mut metadata = IndexMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(CliError::Command(format!(
                "invalid --meta entry '{pair}', expected key=value"
            )));
        };
        metadata.insert(
            key.trim().to_string(),
            serde_json::Value::String(value.trim().to_string()),
        );
    }
    Ok(metadata)
}

fn init_tracing(logging: &taskpipe_core::config::LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("taskpipe"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("taskpipe.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
