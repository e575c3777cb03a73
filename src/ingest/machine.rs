//! Deterministic lifecycle state machine
//!
//! Pure function of (current aggregate, notification, time): no IO, no
//! locking. The [`Ingestor`](super::Ingestor) serializes calls and persists
//! the result.

use super::label::{format_operation_label, Classifier};
use super::notification::{Notification, NotificationKind};
use crate::models::{AgentKind, AgentRecord, CanonicalState, SessionState};
use chrono::{DateTime, Utc};
use std::collections::btree_map::Entry;
use tracing::debug;
use uuid::Uuid;

/// Record synthesized for operations with no attributable unit
pub const ROOT_AGENT_ID: &str = "main";

/// Apply `notification` to `state`, returning the ids of touched records
pub fn apply(
    state: &mut SessionState,
    notification: &Notification,
    now: DateTime<Utc>,
    classifier: &Classifier,
) -> Vec<String> {
    match notification.kind {
        NotificationKind::SessionStart => {
            state.reset(notification.session_id.clone());
            return Vec::new();
        }
        NotificationKind::Stop => {
            state.adopt_session(notification.session_id.as_deref());
            return stop_all(state, now);
        }
        _ => {}
    }

    state.adopt_session(notification.session_id.as_deref());

    let Some(id) = resolve_subject(state, notification) else {
        debug!(kind = %notification.kind, "no unit to attribute notification to");
        return Vec::new();
    };

    state.mutate(|agents| {
        let (record, synthesized) = match agents.entry(id.clone()) {
            Entry::Occupied(entry) => (entry.into_mut(), false),
            Entry::Vacant(entry) => {
                let kind = initial_kind(notification, &id, classifier);
                (entry.insert(AgentRecord::new(id.clone(), kind, now)), true)
            }
        };

        if synthesized && notification.kind != NotificationKind::Create {
            debug!(agent = %id, kind = %notification.kind, "synthesized record for unknown unit");
        }

        apply_to_record(record, notification, now, classifier, synthesized);
    });

    vec![id]
}

/// Force every non-terminal record to `completed`
fn stop_all(state: &mut SessionState, now: DateTime<Utc>) -> Vec<String> {
    state.mutate(|agents| {
        agents
            .values_mut()
            .filter(|record| !record.state.is_terminal())
            .map(|record| {
                record.transition(CanonicalState::Completed, now);
                record.id.clone()
            })
            .collect()
    })
}

fn resolve_subject(state: &SessionState, notification: &Notification) -> Option<String> {
    if let Some(id) = &notification.agent_id {
        return Some(id.clone());
    }

    match notification.kind {
        NotificationKind::Create => Some(format!("agent-{}", Uuid::new_v4())),
        NotificationKind::Start | NotificationKind::End | NotificationKind::Unknown(_) => {
            Some(most_recent_active(state).unwrap_or_else(|| ROOT_AGENT_ID.to_string()))
        }
        _ => most_recent_active(state),
    }
}

/// Most recently started record that is not terminal
fn most_recent_active(state: &SessionState) -> Option<String> {
    state
        .agents()
        .values()
        .filter(|record| !record.state.is_terminal())
        .max_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)))
        .map(|record| record.id.clone())
}

fn initial_kind(notification: &Notification, id: &str, classifier: &Classifier) -> AgentKind {
    if let Some(kind) = notification.agent_kind {
        return kind;
    }

    match (&notification.kind, notification.operation.as_deref()) {
        (NotificationKind::Create, _) => AgentKind::Subagent,
        _ if id == ROOT_AGENT_ID => AgentKind::Subagent,
        (_, Some(operation)) => classifier.kind_for(operation),
        _ => AgentKind::Subagent,
    }
}

fn apply_to_record(
    record: &mut AgentRecord,
    notification: &Notification,
    now: DateTime<Utc>,
    classifier: &Classifier,
    synthesized: bool,
) {
    if let Some(description) = &notification.description {
        record.description = Some(description.clone());
    }
    if notification.agent_type.is_some() {
        record.agent_type = notification.agent_type.clone();
    }
    if notification.parent_id.is_some() {
        record.parent_id = notification.parent_id.clone();
    }

    let label = notification
        .operation
        .as_deref()
        .map(|op| format_operation_label(op, &notification.operation_input));

    match &notification.kind {
        NotificationKind::Create => {
            if let Some(kind) = notification.agent_kind {
                record.kind = kind;
            }
            record.touch(now);
        }

        NotificationKind::Start => {
            if record.state == CanonicalState::Error {
                // Strictly terminal: refresh, never reopen
                record.touch(now);
                if label.is_some() {
                    record.last_tool = label;
                }
                return;
            }

            let target = match notification.operation.as_deref() {
                Some(op) if classifier.is_planning(op) && record.state != CanonicalState::Completed => {
                    CanonicalState::Planning
                }
                _ => CanonicalState::Working,
            };
            record.transition(target, now);

            if label.is_some() {
                record.last_tool = label;
            }
            record.tool_count += 1;
        }

        NotificationKind::End => {
            if synthesized {
                record.transition(CanonicalState::Working, now);
            }
            record.touch(now);
            if label.is_some() {
                record.last_tool = label;
            }
        }

        NotificationKind::Complete => {
            record.transition(CanonicalState::Completed, now);
        }

        NotificationKind::Error => {
            record.transition(CanonicalState::Error, now);
        }

        NotificationKind::Unknown(name) => {
            // Same reopening rule as a start: completed -> working, error stays
            if record.state != CanonicalState::Error {
                record.transition(CanonicalState::Working, now);
            }
            record.touch(now);
            debug!(agent = %record.id, kind = %name, "unknown notification treated as progress");
            if label.is_some() {
                record.last_tool = label;
            }
        }

        NotificationKind::SessionStart | NotificationKind::Stop => {}
    }
}
