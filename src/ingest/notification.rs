//! Lifecycle notifications delivered by the host runtime

use super::IngestError;
use crate::models::AgentKind;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// What happened to a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    /// A new monitoring session begins; all records are dropped
    SessionStart,
    /// A unit was created
    Create,
    /// A unit began an operation
    Start,
    /// A unit finished an operation
    End,
    /// A unit finished its task
    Complete,
    /// The host stopped; every active unit is done
    Stop,
    /// A unit failed or was terminated
    Error,
    /// Anything else; treated as generic progress
    Unknown(String),
}

impl NotificationKind {
    /// Map a host hook name or a plain kind name
    pub fn from_name(name: &str) -> Self {
        match name {
            "SessionStart" | "session_start" => NotificationKind::SessionStart,
            "SubagentStart" | "create" => NotificationKind::Create,
            "PreToolUse" | "start" => NotificationKind::Start,
            "PostToolUse" | "end" => NotificationKind::End,
            "SubagentStop" | "TaskCompleted" | "complete" => NotificationKind::Complete,
            "Stop" | "SessionEnd" | "stop" => NotificationKind::Stop,
            "SubagentError" | "error" | "terminate" => NotificationKind::Error,
            other => NotificationKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            NotificationKind::SessionStart => "session_start",
            NotificationKind::Create => "create",
            NotificationKind::Start => "start",
            NotificationKind::End => "end",
            NotificationKind::Complete => "complete",
            NotificationKind::Stop => "stop",
            NotificationKind::Error => "error",
            NotificationKind::Unknown(name) => name,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifecycle notification
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub kind: NotificationKind,
    pub session_id: Option<String>,
    /// Subject unit; resolved from context when absent
    pub agent_id: Option<String>,
    pub agent_kind: Option<AgentKind>,
    pub agent_type: Option<String>,
    /// Operation/category name (e.g. a tool name)
    pub operation: Option<String>,
    /// Operation arguments, used to build a readable label
    pub operation_input: Value,
    pub description: Option<String>,
    pub parent_id: Option<String>,
}

/// Wire shape accepted from the host (hook payloads or plain kinds)
#[derive(Debug, Deserialize)]
struct RawNotification {
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    hook_event_name: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    agent_id: Option<String>,
    #[serde(default)]
    agent_kind: Option<AgentKind>,
    #[serde(default)]
    agent_type: Option<String>,
    #[serde(default, alias = "operation")]
    tool_name: Option<String>,
    #[serde(default)]
    tool_input: Value,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Notification {
    pub fn new(kind: NotificationKind) -> Self {
        Self {
            kind,
            session_id: None,
            agent_id: None,
            agent_kind: None,
            agent_type: None,
            operation: None,
            operation_input: Value::Null,
            description: None,
            parent_id: None,
        }
    }

    /// Parse one host payload
    pub fn from_hook_json(raw: &str) -> Result<Self, IngestError> {
        if raw.trim().is_empty() {
            return Err(IngestError::Malformed("empty payload".to_string()));
        }

        let parsed: RawNotification =
            serde_json::from_str(raw).map_err(|e| IngestError::Malformed(e.to_string()))?;

        let name = non_empty(parsed.kind.or(parsed.hook_event_name)).ok_or_else(|| {
            IngestError::Malformed("missing `kind` or `hook_event_name`".to_string())
        })?;

        let mut description = non_empty(parsed.description);
        if description.is_none() {
            description = parsed
                .tool_input
                .get("description")
                .and_then(Value::as_str)
                .filter(|_| parsed.tool_name.as_deref() == Some("Task"))
                .map(str::to_string);
        }

        Ok(Self {
            kind: NotificationKind::from_name(name.trim()),
            session_id: non_empty(parsed.session_id),
            agent_id: non_empty(parsed.agent_id),
            agent_kind: parsed.agent_kind,
            agent_type: non_empty(parsed.agent_type),
            operation: non_empty(parsed.tool_name),
            operation_input: parsed.tool_input,
            description,
            parent_id: non_empty(parsed.parent_id),
        })
    }

    pub fn session_start(session_id: impl Into<String>) -> Self {
        Self::new(NotificationKind::SessionStart).with_session(session_id)
    }

    pub fn create(agent_id: impl Into<String>) -> Self {
        Self::new(NotificationKind::Create).with_agent(agent_id)
    }

    pub fn start(agent_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::new(NotificationKind::Start)
            .with_agent(agent_id)
            .with_operation(operation)
    }

    pub fn end(agent_id: impl Into<String>) -> Self {
        Self::new(NotificationKind::End).with_agent(agent_id)
    }

    pub fn complete(agent_id: impl Into<String>) -> Self {
        Self::new(NotificationKind::Complete).with_agent(agent_id)
    }

    pub fn stop() -> Self {
        Self::new(NotificationKind::Stop)
    }

    pub fn error(agent_id: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error).with_agent(agent_id)
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.operation_input = input;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_kind(mut self, kind: AgentKind) -> Self {
        self.agent_kind = Some(kind);
        self
    }
}
