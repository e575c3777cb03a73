//! Session aggregate: the persisted state document

use super::agent::{AgentRecord, CanonicalState};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Record count per canonical state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Stats {
    pub total: u64,
    pub waiting: u64,
    pub planning: u64,
    pub working: u64,
    pub completed: u64,
    pub error: u64,
}

impl Stats {
    /// Histogram of records by canonical state
    pub fn from_agents<'a>(agents: impl IntoIterator<Item = &'a AgentRecord>) -> Self {
        let mut stats = Stats::default();
        for agent in agents {
            stats.total += 1;
            *stats.slot(agent.state) += 1;
        }
        stats
    }

    pub fn count(&self, state: CanonicalState) -> u64 {
        match state {
            CanonicalState::Waiting => self.waiting,
            CanonicalState::Planning => self.planning,
            CanonicalState::Working => self.working,
            CanonicalState::Completed => self.completed,
            CanonicalState::Error => self.error,
        }
    }

    fn slot(&mut self, state: CanonicalState) -> &mut u64 {
        match state {
            CanonicalState::Waiting => &mut self.waiting,
            CanonicalState::Planning => &mut self.planning,
            CanonicalState::Working => &mut self.working,
            CanonicalState::Completed => &mut self.completed,
            CanonicalState::Error => &mut self.error,
        }
    }
}

/// Aggregate root of the monitor
///
/// Records are only reachable mutably through [`SessionState::mutate`], which
/// recomputes `stats` afterwards, so the summary can never drift from the
/// record mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SessionState {
    /// Time of the last committed write
    last_updated: DateTime<Utc>,

    #[serde(default)]
    session_id: Option<String>,

    #[serde(default)]
    agents: BTreeMap<String, AgentRecord>,

    #[serde(default)]
    stats: Stats,

    /// Fields written by newer versions, carried through untouched
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl SessionState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_updated: now,
            ..Self::default()
        }
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn agents(&self) -> &BTreeMap<String, AgentRecord> {
        &self.agents
    }

    pub fn agent(&self, id: &str) -> Option<&AgentRecord> {
        self.agents.get(id)
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Recompute derived fields after deserialization
    pub fn normalized(mut self) -> Self {
        self.recompute_stats();
        self
    }

    /// Run `f` against the record mapping, then recompute the summary
    pub(crate) fn mutate<R>(&mut self, f: impl FnOnce(&mut BTreeMap<String, AgentRecord>) -> R) -> R {
        let result = f(&mut self.agents);
        self.recompute_stats();
        result
    }

    /// Start a new session: the mapping is dropped wholesale
    pub(crate) fn reset(&mut self, session_id: Option<String>) {
        self.session_id = session_id;
        self.mutate(|agents| agents.clear());
    }

    /// Keep the current session id unless the notification names one
    pub(crate) fn adopt_session(&mut self, session_id: Option<&str>) {
        if let Some(id) = session_id.filter(|id| !id.is_empty()) {
            self.session_id = Some(id.to_string());
        }
    }

    /// Advance `last_updated`; it never moves backwards
    pub(crate) fn stamp(&mut self, now: DateTime<Utc>) {
        self.last_updated = self.last_updated.max(now);
    }

    fn recompute_stats(&mut self) {
        self.stats = Stats::from_agents(self.agents.values());
    }
}

/// JSON Schema describing the state document, served for client self-discovery
pub fn document_schema() -> Value {
    serde_json::to_value(schemars::schema_for!(SessionState)).unwrap_or(Value::Null)
}
