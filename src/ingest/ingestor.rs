//! Ingestor - serialized read/apply/persist of notifications

use super::label::Classifier;
use super::lock;
use super::machine;
use super::notification::Notification;
use super::IngestError;
use crate::config::MonitorConfig;
use crate::models::SessionState;
use crate::monitor::overlay;
use crate::store::StateStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Result of handling one notification, reported back to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Applied { kind: String, agents: Vec<String> },
    Ignored { reason: String },
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied { .. })
    }
}

/// Single writer for the state document
pub struct Ingestor {
    store: Arc<StateStore>,
    classifier: Classifier,
    lock_path: PathBuf,
    lock_timeout: Duration,
    threshold: Duration,
    writer: Mutex<()>,
}

impl Ingestor {
    pub fn new(store: Arc<StateStore>) -> Self {
        let lock_path = store.path().with_extension("lock");
        Self {
            store,
            classifier: Classifier::default(),
            lock_path,
            lock_timeout: Duration::from_millis(2000),
            threshold: overlay::DEFAULT_STALENESS_THRESHOLD,
            writer: Mutex::new(()),
        }
    }

    pub fn from_config(store: Arc<StateStore>, config: &MonitorConfig) -> Self {
        Self::new(store)
            .with_classifier(Classifier::with_planning(config.planning_tools.iter().cloned()))
            .with_lock_timeout(config.lock_timeout())
            .with_threshold(config.staleness_threshold())
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn apply(&self, notification: &Notification) -> Result<Arc<SessionState>, IngestError> {
        self.apply_at(notification, Utc::now())
    }

    /// Apply one notification as of `now` and persist the result
    pub fn apply_at(
        &self,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> Result<Arc<SessionState>, IngestError> {
        self.apply_inner(notification, now).map(|(state, _)| state)
    }

    fn apply_inner(
        &self,
        notification: &Notification,
        now: DateTime<Utc>,
    ) -> Result<(Arc<SessionState>, Vec<String>), IngestError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let _lock = lock::acquire(&self.lock_path, self.lock_timeout)?;

        let mut state = (*self.store.read()).clone();
        let touched = machine::apply(&mut state, notification, now, &self.classifier);
        state.stamp(now);

        let state = overlay::decorate(&state, now, self.threshold);
        self.store.write(&state)?;

        debug!(
            kind = %notification.kind,
            agents = ?touched,
            total = state.stats().total,
            "notification applied"
        );

        Ok((Arc::new(state), touched))
    }

    /// Apply a parsed notification; failures are logged, never returned
    pub fn handle(&self, notification: &Notification) -> Outcome {
        match self.apply_inner(notification, Utc::now()) {
            Ok((_, agents)) => Outcome::Applied {
                kind: notification.kind.to_string(),
                agents,
            },
            Err(e) => {
                warn!(kind = %notification.kind, error = %e, "notification not applied");
                Outcome::Ignored {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Parse and apply one raw host payload
    pub fn handle_raw(&self, raw: &str) -> Outcome {
        match Notification::from_hook_json(raw) {
            Ok(notification) => self.handle(&notification),
            Err(e) => {
                warn!(error = %e, "ignoring malformed notification");
                Outcome::Ignored {
                    reason: e.to_string(),
                }
            }
        }
    }
}
