//! Task-file import.
//!
//! A task file is plain text where each task opens with a `{type}`
//! marker and runs until the next marker or end of file:
//!
//! ```text
//! {search} latest rust async runtimes
//! {create} priority=high::write a summary of the findings
//! ```
//!
//! An unrecognized marker word still starts a task, typed `custom`.
//! Text before the first marker is ignored. A `::` in the body splits
//! it into a `key=value,key=value` metadata prefix and the content.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use taskpipe_core::{Task, TaskType};

lazy_static! {
    static ref MARKER: Regex = Regex::new(r"\{(\w+)\}").unwrap();
}

pub fn parse_task_file(text: &str) -> Vec<Task> {
    let markers: Vec<_> = MARKER.captures_iter(text).collect();
    let mut tasks = Vec::new();

    for (i, cap) in markers.iter().enumerate() {
        let whole = cap.get(0).unwrap();
        let body_start = whole.end();
        let body_end = markers
            .get(i + 1)
            .map(|next| next.get(0).unwrap().start())
            .unwrap_or(text.len());

        let body = text[body_start..body_end].trim();
        if body.is_empty() {
            continue;
        }

        let task_type = cap[1].parse::<TaskType>().unwrap_or(TaskType::Custom);
        let (metadata, content) = split_metadata(body);
        tasks.push(Task::new(task_type, content, metadata));
    }

    tasks
}

fn split_metadata(body: &str) -> (IndexMap<String, serde_json::Value>, String) {
    let Some((meta_part, content)) = body.split_once("::") else {
        return (IndexMap::new(), body.to_string());
    };

    let mut metadata = IndexMap::new();
    for item in meta_part.split(',') {
        if let Some((key, value)) = item.split_once('=') {
            metadata.insert(
                key.trim().to_string(),
                serde_json::Value::String(value.trim().to_string()),
            );
        }
    }
    (metadata, content.trim().to_string())
}
