//! Native change notification via `notify`
//!
//! The watch is placed on the parent directory: writers replace the document
//! by renaming a temporary file over it, which a watch on the file itself
//! would lose after the first write.

use super::{ChangeSignal, SignalError, SignalKind};
use async_trait::async_trait;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Upper bound on how long a continuous burst can defer a firing
const MAX_DEBOUNCE_FACTOR: u32 = 10;

pub struct NativeSignal {
    // Dropping the watcher stops event delivery
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<()>,
    debounce: Duration,
}

impl NativeSignal {
    pub fn open(path: &Path, debounce: Duration) -> Result<Self, SignalError> {
        let file_name = path
            .file_name()
            .ok_or_else(|| SignalError::InvalidPath(path.to_path_buf()))?
            .to_os_string();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let (tx, rx) = mpsc::channel(64);
        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if touches(&event, &file_name) {
                        // A full channel already holds a pending firing
                        let _ = tx.try_send(());
                    }
                }
                Err(e) => warn!(error = %e, "watcher error"),
            },
            Config::default(),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        debug!(dir = %dir.display(), "native watcher started");

        Ok(Self {
            _watcher: watcher,
            rx,
            debounce,
        })
    }
}

fn touches(event: &Event, file_name: &OsString) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

#[async_trait]
impl ChangeSignal for NativeSignal {
    fn kind(&self) -> SignalKind {
        SignalKind::Native
    }

    async fn changed(&mut self) -> bool {
        if self.rx.recv().await.is_none() {
            return false;
        }

        // Trailing edge: fire once the burst has been quiet for `debounce`
        let deadline = Instant::now() + self.debounce * MAX_DEBOUNCE_FACTOR;
        loop {
            let quiet_until = (Instant::now() + self.debounce).min(deadline);
            match tokio::time::timeout_at(quiet_until, self.rx.recv()).await {
                Ok(Some(())) if Instant::now() < deadline => continue,
                _ => return true,
            }
        }
    }
}
