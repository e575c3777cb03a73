//! Change signal for the state document
//!
//! Two sources behind one trait: native filesystem notification through
//! `notify`, and polling of file metadata. `open_signal` picks one from the
//! configured [`WatchMode`].

mod native;
mod poll;

pub use native::NativeSignal;
pub use poll::PollSignal;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("Change notification unavailable: {0}")]
    Unavailable(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot watch '{}': no file name", .0.display())]
    InvalidPath(PathBuf),
}

/// How the server learns that the state document changed
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// Native notification, polling when it cannot be set up
    #[default]
    Auto,
    /// Native notification only
    Native,
    /// Metadata polling only
    Poll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Native,
    Poll,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Native => "native",
            SignalKind::Poll => "poll",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SignalConfig {
    pub mode: WatchMode,
    pub debounce: Duration,
    pub poll_interval: Duration,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            mode: WatchMode::Auto,
            debounce: DEFAULT_DEBOUNCE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Source of "the state document may have changed" events
///
/// Firings carry no payload; consumers re-read the store. Several writes may
/// collapse into one firing.
#[async_trait]
pub trait ChangeSignal: Send {
    fn kind(&self) -> SignalKind;

    /// Wait for the next change
    ///
    /// Returns `false` once the source is gone and no further changes will
    /// be reported.
    async fn changed(&mut self) -> bool;
}

/// Open the change signal for `path` according to `config.mode`
///
/// `auto` falls back to polling when the native watcher cannot be created;
/// `native` surfaces that failure instead.
pub fn open_signal(path: &Path, config: &SignalConfig) -> Result<Box<dyn ChangeSignal>, SignalError> {
    let signal: Box<dyn ChangeSignal> = match config.mode {
        WatchMode::Poll => Box::new(PollSignal::new(path, config.poll_interval)),
        WatchMode::Native => Box::new(NativeSignal::open(path, config.debounce)?),
        WatchMode::Auto => match NativeSignal::open(path, config.debounce) {
            Ok(native) => Box::new(native),
            Err(e) => {
                warn!(error = %e, "native change notification unavailable, falling back to polling");
                Box::new(PollSignal::new(path, config.poll_interval))
            }
        },
    };

    info!(path = %path.display(), signal = signal.kind().as_str(), "watching state file");
    Ok(signal)
}
