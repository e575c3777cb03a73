//! StalenessMonitor - time-driven refresh
//!
//! `permission_wait` can appear with no new notification, so a recurring
//! task re-evaluates the overlay and pushes through the broadcaster even when
//! the state file has not changed.

use super::broadcaster::{refresh_blocking, Broadcaster, Refresh};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// One re-evaluation at a time, remembering the last awaiting-approval count
/// so changes are logged once rather than every tick
pub struct StalenessTicker {
    broadcaster: Arc<Broadcaster>,
    awaiting: usize,
}

impl StalenessTicker {
    pub fn new(broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            broadcaster,
            awaiting: 0,
        }
    }

    /// Records shown as awaiting approval after the last tick
    pub fn awaiting_approval(&self) -> usize {
        self.awaiting
    }

    /// Re-read, re-overlay and push, as of `now`
    pub fn tick_at(&mut self, now: DateTime<Utc>) -> Refresh {
        let refresh = self.broadcaster.refresh_at(now);
        self.record(refresh)
    }

    /// Same as [`tick_at`](Self::tick_at) with the store read off the runtime
    pub async fn tick(&mut self) -> Refresh {
        let refresh = refresh_blocking(&self.broadcaster, Utc::now()).await;
        self.record(refresh)
    }

    fn record(&mut self, refresh: Refresh) -> Refresh {
        if refresh.awaiting_approval != self.awaiting {
            info!(
                awaiting_approval = refresh.awaiting_approval,
                "permission wait count changed"
            );
            self.awaiting = refresh.awaiting_approval;
        }
        debug!(delivered = refresh.delivered, viewers = refresh.viewers, "staleness tick");

        refresh
    }
}

/// Handle to the recurring task; aborts it on drop
pub struct StalenessMonitor {
    handle: JoinHandle<()>,
}

impl StalenessMonitor {
    pub fn spawn(broadcaster: Arc<Broadcaster>, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut ticker = StalenessTicker::new(broadcaster);

            loop {
                interval.tick().await;
                ticker.tick().await;
            }
        });

        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for StalenessMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
