//! Broadcaster - fan-out of snapshots to live viewers
//!
//! Each viewer owns a small bounded channel. Pushes use `try_send`, so a
//! lagging viewer misses intermediate snapshots instead of holding up the
//! others, and a closed channel removes the viewer from the registry.

use super::overlay;
use crate::models::SessionState;
use crate::store::StateStore;
use chrono::{DateTime, Utc};
use futures::Stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info};

/// Serialized snapshot, shared by every viewer it is pushed to
pub type Payload = Arc<str>;

const DEFAULT_VIEWER_BUFFER: usize = 16;

struct Viewer {
    tx: mpsc::Sender<Payload>,
    /// `last_updated` of the newest snapshot delivered
    last_seen: DateTime<Utc>,
}

type Registry = Mutex<HashMap<u64, Viewer>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<u64, Viewer>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Summary of one refresh pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Refresh {
    pub delivered: usize,
    pub viewers: usize,
    pub awaiting_approval: usize,
}

pub struct Broadcaster {
    store: Arc<StateStore>,
    threshold: Duration,
    buffer: usize,
    viewers: Arc<Registry>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self {
            store,
            threshold: overlay::DEFAULT_STALENESS_THRESHOLD,
            buffer: DEFAULT_VIEWER_BUFFER,
            viewers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    pub fn viewer_count(&self) -> usize {
        lock(&self.viewers).len()
    }

    /// Current viewer-facing snapshot, read from the store
    pub fn snapshot(&self) -> SessionState {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> SessionState {
        overlay::decorate(&self.store.read(), now, self.threshold)
    }

    /// Register a viewer; the current snapshot is already queued for it
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_at(Utc::now())
    }

    pub fn subscribe_at(&self, now: DateTime<Utc>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.buffer);

        // Snapshot and registration happen under the registry lock, so a
        // refresh racing this call is either already in the snapshot or
        // delivered to the new viewer afterwards.
        let count = {
            let mut viewers = lock(&self.viewers);
            let snapshot = self.snapshot_at(now);
            let last_seen = snapshot.last_updated();
            if let Some(payload) = encode(&snapshot) {
                // Fresh channel with capacity >= 1: cannot be full
                let _ = tx.try_send(payload);
            }
            viewers.insert(id, Viewer { tx, last_seen });
            viewers.len()
        };
        info!(viewer = id, viewers = count, "viewer subscribed");

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.viewers),
        }
    }

    /// Recompute the snapshot and push it to every viewer
    pub fn refresh(&self) -> Refresh {
        self.refresh_at(Utc::now())
    }

    pub fn refresh_at(&self, now: DateTime<Utc>) -> Refresh {
        let snapshot = self.snapshot_at(now);
        let awaiting_approval = overlay::awaiting_approval(&snapshot);

        let Some(payload) = encode(&snapshot) else {
            return Refresh {
                delivered: 0,
                viewers: self.viewer_count(),
                awaiting_approval,
            };
        };
        let stamp = snapshot.last_updated();

        let mut delivered = 0;
        let mut viewers = lock(&self.viewers);
        viewers.retain(|id, viewer| {
            if stamp < viewer.last_seen {
                return true;
            }
            match viewer.tx.try_send(Arc::clone(&payload)) {
                Ok(()) => {
                    viewer.last_seen = stamp;
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    debug!(viewer = id, "viewer lagging, snapshot skipped");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(viewer = id, "viewer disconnected, dropping");
                    false
                }
            }
        });

        Refresh {
            delivered,
            viewers: viewers.len(),
            awaiting_approval,
        }
    }

    /// Disconnect every viewer; their feeds end after draining
    pub fn close(&self) {
        let closed = {
            let mut viewers = lock(&self.viewers);
            let count = viewers.len();
            viewers.clear();
            count
        };
        if closed > 0 {
            info!(viewers = closed, "viewers disconnected");
        }
    }
}

/// [`Broadcaster::refresh_at`] on the blocking pool
///
/// Store reads are synchronous and may pause between retries; async callers
/// go through these instead of calling the broadcaster inline.
pub async fn refresh_blocking(broadcaster: &Arc<Broadcaster>, now: DateTime<Utc>) -> Refresh {
    let target = Arc::clone(broadcaster);
    match tokio::task::spawn_blocking(move || target.refresh_at(now)).await {
        Ok(refresh) => refresh,
        Err(e) => {
            error!(error = %e, "refresh task failed");
            Refresh {
                delivered: 0,
                viewers: broadcaster.viewer_count(),
                awaiting_approval: 0,
            }
        }
    }
}

/// [`Broadcaster::snapshot`] on the blocking pool; `None` if the task failed
pub async fn snapshot_blocking(broadcaster: &Arc<Broadcaster>) -> Option<SessionState> {
    let target = Arc::clone(broadcaster);
    tokio::task::spawn_blocking(move || target.snapshot())
        .await
        .map_err(|e| error!(error = %e, "snapshot task failed"))
        .ok()
}

/// [`Broadcaster::subscribe`] on the blocking pool; `None` if the task failed
pub async fn subscribe_blocking(broadcaster: &Arc<Broadcaster>) -> Option<Subscription> {
    let target = Arc::clone(broadcaster);
    tokio::task::spawn_blocking(move || target.subscribe())
        .await
        .map_err(|e| error!(error = %e, "subscribe task failed"))
        .ok()
}

fn encode(snapshot: &SessionState) -> Option<Payload> {
    match serde_json::to_string(snapshot) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            error!(error = %e, "failed to encode snapshot");
            None
        }
    }
}

/// One viewer's feed; dropping it unsubscribes
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Payload>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next snapshot; `None` once the broadcaster is gone
    pub async fn recv(&mut self) -> Option<Payload> {
        self.rx.recv().await
    }

    /// Next snapshot if one is already queued
    pub fn try_recv(&mut self) -> Option<Payload> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> impl Stream<Item = Payload> + Send + 'static {
        futures::stream::unfold(self, |mut subscription| async move {
            let payload = subscription.recv().await?;
            Some((payload, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(&self.id);
            debug!(viewer = self.id, "viewer unsubscribed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{Ingestor, Notification};
    use crate::models::{CanonicalState, DisplayState};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Ingestor, Broadcaster) {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(StateStore::new(temp.path().join("state.json")));
        let ingestor = Ingestor::new(Arc::clone(&store));
        let broadcaster = Broadcaster::new(store).with_buffer(4);
        (temp, ingestor, broadcaster)
    }

    fn decode(payload: &Payload) -> SessionState {
        serde_json::from_str(payload).unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_receives_current_snapshot() {
        let (_temp, ingestor, broadcaster) = setup();
        ingestor.apply(&Notification::start("A", "Read")).unwrap();

        let mut subscription = broadcaster.subscribe();
        let snapshot = decode(&subscription.try_recv().unwrap());

        assert_eq!(snapshot.agent("A").unwrap().state, CanonicalState::Working);
        assert_eq!(broadcaster.viewer_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_reaches_every_viewer() {
        let (_temp, ingestor, broadcaster) = setup();
        let mut first = broadcaster.subscribe();
        let mut second = broadcaster.subscribe();
        first.try_recv().unwrap();
        second.try_recv().unwrap();

        ingestor.apply(&Notification::create("A")).unwrap();
        let refresh = broadcaster.refresh();

        assert_eq!(refresh.delivered, 2);
        assert!(decode(&first.recv().await.unwrap()).agent("A").is_some());
        assert!(decode(&second.recv().await.unwrap()).agent("A").is_some());
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_removed() {
        let (_temp, _ingestor, broadcaster) = setup();
        let subscription = broadcaster.subscribe();
        let _other = broadcaster.subscribe();
        assert_eq!(broadcaster.viewer_count(), 2);

        drop(subscription);
        assert_eq!(broadcaster.viewer_count(), 1);
    }

    #[tokio::test]
    async fn test_close_ends_feeds() {
        let (_temp, _ingestor, broadcaster) = setup();
        let mut subscription = broadcaster.subscribe();

        broadcaster.close();

        assert_eq!(broadcaster.viewer_count(), 0);
        assert!(subscription.recv().await.is_some());
        assert!(subscription.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_lagging_viewer_does_not_block_others() {
        let (_temp, ingestor, broadcaster) = setup();
        let _stalled = broadcaster.subscribe();
        let mut live = broadcaster.subscribe();
        live.try_recv().unwrap();

        for i in 0..10 {
            ingestor.apply(&Notification::create(format!("agent-{i}"))).unwrap();
            let refresh = broadcaster.refresh();
            assert!(refresh.delivered >= 1);
            let snapshot = decode(&live.recv().await.unwrap());
            assert_eq!(snapshot.agents().len(), i + 1);
        }

        assert_eq!(broadcaster.viewer_count(), 2);
    }

    #[tokio::test]
    async fn test_viewer_never_sees_older_snapshot() {
        let (_temp, ingestor, broadcaster) = setup();
        let t0 = Utc::now();

        ingestor.apply_at(&Notification::start("A", "Read"), t0).unwrap();
        let older = std::fs::read_to_string(ingestor.store().path()).unwrap();

        let t1 = t0 + chrono::Duration::seconds(2);
        ingestor.apply_at(&Notification::start("B", "Read"), t1).unwrap();
        let mut viewer = broadcaster.subscribe_at(t1);
        assert_eq!(decode(&viewer.try_recv().unwrap()).last_updated(), t1);

        // A writer rolled the file back to an earlier document
        std::fs::write(ingestor.store().path(), older).unwrap();
        let refresh = broadcaster.refresh_at(t1);

        assert_eq!(refresh.delivered, 0);
        assert!(viewer.try_recv().is_none());
        assert_eq!(broadcaster.viewer_count(), 1);
    }

    #[tokio::test]
    async fn test_same_stamp_with_new_overlay_is_delivered() {
        let (_temp, ingestor, broadcaster) = setup();
        let t0 = Utc::now();

        ingestor.apply_at(&Notification::start("A", "Bash"), t0).unwrap();
        let mut viewer = broadcaster.subscribe_at(t0);
        viewer.try_recv().unwrap();

        let refresh = broadcaster.refresh_at(t0 + chrono::Duration::seconds(8));
        assert_eq!(refresh.delivered, 1);

        let pushed = decode(&viewer.try_recv().unwrap());
        assert_eq!(pushed.last_updated(), t0);
        assert_eq!(pushed.agent("A").unwrap().display_state, DisplayState::PermissionWait);
    }

    #[test]
    fn test_write_racing_subscribe_reaches_viewer() {
        for round in 0..50 {
            let (_temp, ingestor, broadcaster) = setup();
            let ingestor = Arc::new(ingestor);
            let broadcaster = Arc::new(broadcaster);

            let writer = {
                let ingestor = Arc::clone(&ingestor);
                let broadcaster = Arc::clone(&broadcaster);
                std::thread::spawn(move || {
                    ingestor.apply(&Notification::create("late")).unwrap();
                    broadcaster.refresh();
                })
            };
            let mut viewer = broadcaster.subscribe();
            writer.join().unwrap();

            let mut latest = None;
            while let Some(payload) = viewer.try_recv() {
                latest = Some(decode(&payload));
            }
            assert!(
                latest.unwrap().agent("late").is_some(),
                "round {round}: viewer missed the write"
            );
        }
    }

    #[tokio::test]
    async fn test_blocking_helpers_match_inline_calls() {
        let (_temp, ingestor, broadcaster) = setup();
        let broadcaster = Arc::new(broadcaster);
        ingestor.apply(&Notification::create("A")).unwrap();

        let mut viewer = subscribe_blocking(&broadcaster).await.unwrap();
        viewer.try_recv().unwrap();

        ingestor.apply(&Notification::start("A", "Read")).unwrap();
        let refresh = refresh_blocking(&broadcaster, Utc::now()).await;
        assert_eq!(refresh.delivered, 1);

        let snapshot = snapshot_blocking(&broadcaster).await.unwrap();
        assert_eq!(snapshot.agent("A").unwrap().state, CanonicalState::Working);
        assert_eq!(decode(&viewer.try_recv().unwrap()), snapshot);
    }

    #[tokio::test]
    async fn test_refresh_marks_permission_wait() {
        let (_temp, ingestor, broadcaster) = setup();
        let t0 = Utc::now();
        ingestor.apply_at(&Notification::start("A", "Bash"), t0).unwrap();

        let refresh = broadcaster.refresh_at(t0 + chrono::Duration::seconds(8));
        assert_eq!(refresh.awaiting_approval, 1);

        let snapshot = broadcaster.snapshot_at(t0 + chrono::Duration::seconds(8));
        assert_eq!(snapshot.agent("A").unwrap().display_state, DisplayState::PermissionWait);
    }
}
