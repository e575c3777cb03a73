//! Polling change signal
//!
//! Compares file identity (mtime, length, inode) on a fixed interval. Two
//! writes inside one mtime tick that leave length and inode unchanged are
//! indistinguishable here.

use super::{ChangeSignal, SignalKind};
use crate::store::Freshness;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

pub struct PollSignal {
    path: PathBuf,
    period: Duration,
    // Created on first use so construction needs no runtime
    interval: Option<Interval>,
    last: Option<Freshness>,
}

impl PollSignal {
    pub fn new(path: &Path, period: Duration) -> Self {
        Self {
            path: path.to_path_buf(),
            period,
            interval: None,
            last: Freshness::of(path),
        }
    }
}

#[async_trait]
impl ChangeSignal for PollSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Poll
    }

    async fn changed(&mut self) -> bool {
        let period = self.period;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            interval.tick().await;
            let current = Freshness::of(&self.path);
            if current != self.last {
                self.last = current;
                return true;
            }
        }
    }
}
