//! Prompt template resolution.
//!
//! Pure substitution of `{placeholder}` markers against task state, in
//! a fixed order: `{content}`, `{task_id}`, step results (legacy
//! `{step_result}` and current `{step}` forms), metadata keys, then a
//! final pass that blanks whatever `{...}` is still left. The blanking
//! pass also masks literal brace text; existing configs depend on it.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::task::Task;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\{[^{}]+\}").expect("placeholder regex");
}

/// Output of [`resolve_strict`]: the resolved text plus the names of
/// placeholders that had no binding and were blanked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub text: String,
    pub unresolved: Vec<String>,
}

/// Resolve `template` against `task`, blanking unresolved placeholders.
pub fn resolve(template: &str, task: &Task) -> String {
    resolve_strict(template, task).text
}

/// Resolve `template` against `task`, reporting which placeholders
/// could not be bound. Deterministic and idempotent: resolving a
/// string with no `{...}` left returns it unchanged.
pub fn resolve_strict(template: &str, task: &Task) -> Resolved {
    if template.is_empty() {
        return Resolved {
            text: String::new(),
            unresolved: Vec::new(),
        };
    }

    let mut text = template.to_string();

    text = text.replace("{content}", &task.content);
    text = text.replace("{task_id}", &task.id);

    // Step results, in map (= execution) order. The `_result` suffix is
    // the legacy placeholder form; both forms render identically.
    for (step_name, value) in &task.results {
        let rendered = render_value(value);
        let legacy = format!("{{{step_name}_result}}");
        if text.contains(&legacy) {
            text = text.replace(&legacy, &rendered);
        }
        let current = format!("{{{step_name}}}");
        if text.contains(&current) {
            text = text.replace(&current, &rendered);
        }
    }

    for (key, value) in &task.metadata {
        let placeholder = format!("{{{key}}}");
        if text.contains(&placeholder) {
            text = text.replace(&placeholder, &render_value(value));
        }
    }

    // Blank anything still unresolved so a missing binding never leaks
    // a raw `{marker}` into a prompt.
    let mut unresolved = Vec::new();
    let text = PLACEHOLDER
        .replace_all(&text, |caps: &regex::Captures<'_>| {
            let m = caps.get(0).expect("match").as_str();
            unresolved.push(m[1..m.len() - 1].to_string());
            ""
        })
        .into_owned();

    Resolved { text, unresolved }
}

/// String rendering of a step result or metadata value: objects
/// pretty-print, arrays join their rendered elements with newlines,
/// strings pass through, everything else renders compactly.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Object(_) => serde_json::to_string_pretty(value).unwrap_or_default(),
        Value::Array(items) => items
            .iter()
            .map(render_value)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskType;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn task() -> Task {
        let mut metadata = IndexMap::new();
        metadata.insert("tone".to_string(), json!("formal"));
        let mut t = Task::new(TaskType::Process, "improve this text", metadata);
        t.id = "process_test".to_string();
        t
    }

    #[test]
    fn substitutes_content_and_id() {
        let t = task();
        assert_eq!(
            resolve("Improve: {content} ({task_id})", &t),
            "Improve: improve this text (process_test)"
        );
    }

    #[test]
    fn substitutes_results_in_both_forms() {
        let mut t = task();
        t.results.insert("analyze".to_string(), json!("key points"));
        assert_eq!(resolve("A: {analyze}", &t), "A: key points");
        assert_eq!(resolve("A: {analyze_result}", &t), "A: key points");
    }

    #[test]
    fn renders_arrays_newline_joined() {
        let mut t = task();
        t.results
            .insert("hits".to_string(), json!(["one", "two", "three"]));
        assert_eq!(resolve("{hits}", &t), "one\ntwo\nthree");
    }

    #[test]
    fn renders_objects_pretty_printed() {
        let mut t = task();
        t.results.insert("search".to_string(), json!({"q": "rust"}));
        let out = resolve("r = {search}", &t);
        assert!(out.contains("\"q\": \"rust\""));
    }

    #[test]
    fn metadata_binds_after_results() {
        let t = task();
        assert_eq!(resolve("Write in a {tone} tone", &t), "Write in a formal tone");
    }

    #[test]
    fn unknown_placeholder_blanks_to_empty() {
        let t = task();
        assert_eq!(resolve("before {nonexistent_step} after", &t), "before  after");
    }

    #[test]
    fn strict_mode_reports_unresolved_names() {
        let t = task();
        let resolved = resolve_strict("{content} {missing} {also_missing}", &t);
        assert_eq!(resolved.text, "improve this text  ");
        assert_eq!(
            resolved.unresolved,
            vec!["missing".to_string(), "also_missing".to_string()]
        );
    }

    #[test]
    fn idempotent_on_fully_resolved_text() {
        let t = task();
        let once = resolve("Improve: {content}", &t);
        let twice = resolve(&once, &t);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_template_stays_empty() {
        let t = task();
        assert_eq!(resolve("", &t), "");
    }
}
