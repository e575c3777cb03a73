//! Display-state overlay
//!
//! The one function deciding what viewers see. Both the writer (before
//! persisting) and the broadcaster (on every refresh) go through here.

use crate::models::{AgentRecord, CanonicalState, DisplayState, SessionState};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Working for longer than this without news means the unit is probably
/// blocked on an approval prompt
pub const DEFAULT_STALENESS_THRESHOLD: Duration = Duration::from_secs(7);

pub fn display_state(record: &AgentRecord, now: DateTime<Utc>, threshold: Duration) -> DisplayState {
    if record.state == CanonicalState::Working {
        let stale = now
            .signed_duration_since(record.updated_at)
            .to_std()
            .is_ok_and(|elapsed| elapsed > threshold);
        if stale {
            return DisplayState::PermissionWait;
        }
    }

    record.state.into()
}

/// Copy of `state` with every record's display fields recomputed
pub fn decorate(state: &SessionState, now: DateTime<Utc>, threshold: Duration) -> SessionState {
    let mut decorated = state.clone();
    decorated.mutate(|agents| {
        for record in agents.values_mut() {
            let display = display_state(record, now, threshold);
            record.set_display(display);
        }
    });
    decorated
}

/// Number of records currently shown as awaiting approval
pub fn awaiting_approval(state: &SessionState) -> usize {
    state
        .agents()
        .values()
        .filter(|r| r.display_state == DisplayState::PermissionWait)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AgentKind;
    use chrono::Duration as ChronoDuration;

    fn working(updated_at: DateTime<Utc>) -> AgentRecord {
        let mut record = AgentRecord::new("a", AgentKind::Tool, updated_at);
        record.state = CanonicalState::Working;
        record
    }

    #[test]
    fn test_threshold_is_strict() {
        let t0 = Utc::now();
        let record = working(t0);

        let at_threshold = t0 + ChronoDuration::seconds(7);
        assert_eq!(
            display_state(&record, at_threshold, DEFAULT_STALENESS_THRESHOLD),
            DisplayState::Working
        );

        let past = t0 + ChronoDuration::milliseconds(7001);
        assert_eq!(
            display_state(&record, past, DEFAULT_STALENESS_THRESHOLD),
            DisplayState::PermissionWait
        );
    }

    #[test]
    fn test_only_working_goes_stale() {
        let t0 = Utc::now();
        let later = t0 + ChronoDuration::seconds(60);

        for state in [
            CanonicalState::Waiting,
            CanonicalState::Planning,
            CanonicalState::Completed,
            CanonicalState::Error,
        ] {
            let mut record = working(t0);
            record.state = state;
            assert_eq!(
                display_state(&record, later, DEFAULT_STALENESS_THRESHOLD),
                DisplayState::from(state)
            );
        }
    }

    #[test]
    fn test_clock_skew_is_not_stale() {
        let t0 = Utc::now();
        let record = working(t0);
        let earlier = t0 - ChronoDuration::seconds(30);
        assert_eq!(
            display_state(&record, earlier, DEFAULT_STALENESS_THRESHOLD),
            DisplayState::Working
        );
    }

    #[test]
    fn test_decorate_sets_labels_without_touching_canonical() {
        let t0 = Utc::now();
        let mut state = SessionState::new(t0);
        state.mutate(|agents| {
            agents.insert("a".into(), working(t0));
        });

        let decorated = decorate(&state, t0 + ChronoDuration::seconds(8), DEFAULT_STALENESS_THRESHOLD);
        let record = decorated.agent("a").unwrap();

        assert_eq!(record.state, CanonicalState::Working);
        assert_eq!(record.display_state, DisplayState::PermissionWait);
        assert_eq!(record.state_label, "Awaiting approval");
        assert_eq!(decorated.stats(), state.stats());
        assert_eq!(awaiting_approval(&decorated), 1);
    }
}
