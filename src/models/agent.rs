//! Agent record and lifecycle states

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of work unit a record tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    #[default]
    Subagent,
    Tool,
    McpCall,
    Hook,
}

/// Authoritative lifecycle state of a unit
///
/// `waiting -> {planning, working} -> {completed, error}`. `planning` and
/// `working` may alternate; `completed` can only be left for `working`
/// (a unit re-invoked after finishing) and `error` is never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalState {
    #[default]
    Waiting,
    Planning,
    Working,
    Completed,
    Error,
}

impl CanonicalState {
    pub const ALL: [CanonicalState; 5] = [
        CanonicalState::Waiting,
        CanonicalState::Planning,
        CanonicalState::Working,
        CanonicalState::Completed,
        CanonicalState::Error,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, CanonicalState::Completed | CanonicalState::Error)
    }

    /// Whether the lifecycle automaton allows moving from `self` to `to`
    pub fn can_transition(self, to: CanonicalState) -> bool {
        use CanonicalState::*;

        if self == to {
            return true;
        }

        match (self, to) {
            (_, Waiting) => false,
            (Waiting, _) => true,
            (Planning | Working, _) => true,
            (Completed, Working) => true,
            (Completed, _) | (Error, _) => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalState::Waiting => "waiting",
            CanonicalState::Planning => "planning",
            CanonicalState::Working => "working",
            CanonicalState::Completed => "completed",
            CanonicalState::Error => "error",
        }
    }
}

impl fmt::Display for CanonicalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Viewer-facing state: the canonical state plus the time-derived
/// `permission_wait` overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    #[default]
    Waiting,
    Planning,
    Working,
    Completed,
    Error,
    PermissionWait,
}

impl DisplayState {
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayState::Waiting => "waiting",
            DisplayState::Planning => "planning",
            DisplayState::Working => "working",
            DisplayState::Completed => "completed",
            DisplayState::Error => "error",
            DisplayState::PermissionWait => "permission_wait",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            DisplayState::Waiting | DisplayState::PermissionWait => "\u{23f3}",
            DisplayState::Planning => "\u{1f4cb}",
            DisplayState::Working => "\u{2699}\u{fe0f}",
            DisplayState::Completed => "\u{2705}",
            DisplayState::Error => "\u{274c}",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DisplayState::Waiting => "Waiting for instructions",
            DisplayState::Planning => "Planning",
            DisplayState::Working => "Working",
            DisplayState::Completed => "Completed",
            DisplayState::Error => "Error",
            DisplayState::PermissionWait => "Awaiting approval",
        }
    }
}

impl From<CanonicalState> for DisplayState {
    fn from(state: CanonicalState) -> Self {
        match state {
            CanonicalState::Waiting => DisplayState::Waiting,
            CanonicalState::Planning => DisplayState::Planning,
            CanonicalState::Working => DisplayState::Working,
            CanonicalState::Completed => DisplayState::Completed,
            CanonicalState::Error => DisplayState::Error,
        }
    }
}

impl fmt::Display for DisplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AgentRecord {
    /// Identifier, unique within a session
    pub id: String,

    #[serde(rename = "type", default)]
    pub kind: AgentKind,

    /// Canonical lifecycle state
    pub state: CanonicalState,

    /// Canonical state with the staleness overlay applied
    #[serde(default)]
    pub display_state: DisplayState,

    /// Human description of the unit's task
    #[serde(default)]
    pub description: Option<String>,

    /// Host-side agent type label (e.g. "Explore", "general-purpose")
    #[serde(default)]
    pub agent_type: Option<String>,

    #[serde(default)]
    pub icon: String,

    #[serde(default)]
    pub state_label: String,

    /// Label of the most recent operation
    #[serde(default)]
    pub last_tool: Option<String>,

    #[serde(default)]
    pub tool_count: u64,

    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Parent unit, lookup only; may name a record that does not exist yet
    #[serde(default)]
    pub parent_id: Option<String>,

    /// Fields written by newer versions, carried through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AgentRecord {
    pub fn new(id: impl Into<String>, kind: AgentKind, now: DateTime<Utc>) -> Self {
        let display_state = DisplayState::from(CanonicalState::Waiting);
        Self {
            id: id.into(),
            kind,
            state: CanonicalState::Waiting,
            display_state,
            description: None,
            agent_type: None,
            icon: display_state.icon().to_string(),
            state_label: display_state.label().to_string(),
            last_tool: None,
            tool_count: 0,
            started_at: now,
            updated_at: now,
            parent_id: None,
            extra: Map::new(),
        }
    }

    /// Advance `updated_at`, never below `started_at`
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now.max(self.started_at);
    }

    /// Move to `to` if the automaton allows it; always touches the record.
    /// Returns whether the canonical state was allowed to change.
    pub(crate) fn transition(&mut self, to: CanonicalState, now: DateTime<Utc>) -> bool {
        let allowed = self.state.can_transition(to);
        if allowed {
            self.state = to;
        }
        self.touch(now);
        allowed
    }

    /// Set the display state and the labels derived from it
    pub(crate) fn set_display(&mut self, display: DisplayState) {
        self.display_state = display;
        self.icon = display.icon().to_string();
        self.state_label = display.label().to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_transition_table() {
        use CanonicalState::*;

        assert!(Waiting.can_transition(Planning));
        assert!(Waiting.can_transition(Working));
        assert!(Waiting.can_transition(Completed));
        assert!(Planning.can_transition(Working));
        assert!(Working.can_transition(Planning));
        assert!(Working.can_transition(Error));
        assert!(Completed.can_transition(Working));

        assert!(!Working.can_transition(Waiting));
        assert!(!Completed.can_transition(Planning));
        assert!(!Completed.can_transition(Error));
        assert!(!Error.can_transition(Working));
        assert!(!Error.can_transition(Completed));
    }

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = CanonicalState::ALL
            .into_iter()
            .filter(|s| s.is_terminal())
            .collect();
        assert_eq!(terminal, vec![CanonicalState::Completed, CanonicalState::Error]);
    }

    #[test]
    fn test_touch_never_precedes_start() {
        let now = Utc::now();
        let mut record = AgentRecord::new("a", AgentKind::Tool, now);

        record.touch(now - Duration::seconds(30));
        assert_eq!(record.updated_at, record.started_at);

        record.touch(now + Duration::seconds(5));
        assert!(record.updated_at > record.started_at);
    }

    #[test]
    fn test_rejected_transition_still_touches() {
        let now = Utc::now();
        let mut record = AgentRecord::new("a", AgentKind::Subagent, now);
        assert!(record.transition(CanonicalState::Error, now));

        let later = now + Duration::seconds(1);
        assert!(!record.transition(CanonicalState::Working, later));
        assert_eq!(record.state, CanonicalState::Error);
        assert_eq!(record.updated_at, later);
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        assert_eq!(serde_json::to_string(&AgentKind::McpCall).unwrap(), "\"mcp-call\"");
        assert_eq!(
            serde_json::to_string(&DisplayState::PermissionWait).unwrap(),
            "\"permission_wait\""
        );
    }
}
