//! Operation classification and human-readable labels

use crate::models::AgentKind;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

/// Operations that indicate planning/exploration rather than work
pub const PLANNING_OPERATIONS: &[&str] = &[
    "Plan",
    "Explore",
    "EnterPlanMode",
    "ExitPlanMode",
    "AskUserQuestion",
];

const MCP_PREFIX: &str = "mcp__";

/// Decides whether an operation is planning and what kind of unit runs it
#[derive(Debug, Clone)]
pub struct Classifier {
    planning: HashSet<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            planning: PLANNING_OPERATIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Classifier {
    /// Default planning set plus `extra` names
    pub fn with_planning<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut classifier = Self::default();
        classifier.planning.extend(extra.into_iter().map(Into::into));
        classifier
    }

    pub fn is_planning(&self, operation: &str) -> bool {
        self.planning.contains(operation)
    }

    /// Kind of a unit first seen through `operation`
    pub fn kind_for(&self, operation: &str) -> AgentKind {
        if operation.starts_with(MCP_PREFIX) {
            AgentKind::McpCall
        } else {
            AgentKind::Tool
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn input_str<'a>(input: &'a Value, key: &str) -> &'a str {
    input.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Format an operation and its input into a short label
pub fn format_operation_label(operation: &str, input: &Value) -> String {
    match operation {
        "Bash" => {
            let command = input_str(input, "command").replace('\n', " ");
            let command = truncate(command.trim(), 40);
            if command.is_empty() {
                operation.to_string()
            } else {
                format!("$ {}", command)
            }
        }
        "Read" | "Write" | "Edit" => {
            let path = match input_str(input, "file_path") {
                "" => input_str(input, "path"),
                path => path,
            };
            match Path::new(path).file_name() {
                Some(name) => format!("{}: {}", operation, name.to_string_lossy()),
                None => operation.to_string(),
            }
        }
        "Grep" => {
            let pattern = truncate(input_str(input, "pattern"), 30);
            if pattern.is_empty() {
                operation.to_string()
            } else {
                format!("grep {}", pattern)
            }
        }
        "Task" => {
            let description = truncate(input_str(input, "description"), 35);
            if description.is_empty() {
                operation.to_string()
            } else {
                format!("Task: {}", description)
            }
        }
        _ => operation.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bash_label() {
        let input = json!({"command": "  cargo test\n  --workspace  "});
        assert_eq!(format_operation_label("Bash", &input), "$ cargo test   --workspace");
        assert_eq!(format_operation_label("Bash", &Value::Null), "Bash");
    }

    #[test]
    fn test_bash_label_truncated() {
        let input = json!({"command": "x".repeat(100)});
        assert_eq!(format_operation_label("Bash", &input).chars().count(), 42);
    }

    #[test]
    fn test_file_labels() {
        let input = json!({"file_path": "/repo/src/main.rs"});
        assert_eq!(format_operation_label("Read", &input), "Read: main.rs");

        let input = json!({"path": "docs/guide.md"});
        assert_eq!(format_operation_label("Edit", &input), "Edit: guide.md");

        assert_eq!(format_operation_label("Write", &json!({})), "Write");
    }

    #[test]
    fn test_grep_and_task_labels() {
        assert_eq!(
            format_operation_label("Grep", &json!({"pattern": "fn main"})),
            "grep fn main"
        );
        assert_eq!(
            format_operation_label("Task", &json!({"description": "Review store"})),
            "Task: Review store"
        );
        assert_eq!(format_operation_label("WebFetch", &json!({"url": "x"})), "WebFetch");
    }

    #[test]
    fn test_classifier() {
        let classifier = Classifier::with_planning(["Brainstorm"]);
        assert!(classifier.is_planning("Explore"));
        assert!(classifier.is_planning("Brainstorm"));
        assert!(!classifier.is_planning("Read"));

        assert_eq!(classifier.kind_for("mcp__github__search"), AgentKind::McpCall);
        assert_eq!(classifier.kind_for("Read"), AgentKind::Tool);
    }
}
