//! Monitor configuration (`<state-dir>/config.toml`)

use crate::signal::{SignalConfig, WatchMode};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.toml";
pub const STATE_DIR_ENV: &str = "AGENT_MONITOR_DIR";

/// Monitor configuration
///
/// Every field has a default, so a partial file (or none at all) is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Port for the local HTTP surface (bound to 127.0.0.1)
    pub port: u16,

    /// State document, relative to the state directory unless absolute
    pub state_file: PathBuf,

    /// Seconds a working unit may stay silent before it shows as awaiting approval
    pub staleness_threshold_secs: u64,

    pub tick_interval_ms: u64,
    pub debounce_ms: u64,
    pub poll_interval_ms: u64,
    pub watch: WatchMode,

    /// How long an ingest waits for the writer lock
    pub lock_timeout_ms: u64,

    /// Snapshots queued per viewer before it starts missing updates
    pub viewer_buffer: usize,

    /// Operation names treated as planning, on top of the built-in set
    pub planning_tools: Vec<String>,

    #[serde(skip)]
    state_dir: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            port: 3847,
            state_file: PathBuf::from("state.json"),
            staleness_threshold_secs: 7,
            tick_interval_ms: 1000,
            debounce_ms: 50,
            poll_interval_ms: 250,
            watch: WatchMode::Auto,
            lock_timeout_ms: 2000,
            viewer_buffer: 16,
            planning_tools: Vec::new(),
            state_dir: PathBuf::from("."),
        }
    }
}

impl MonitorConfig {
    /// Load config for `state_dir`
    ///
    /// With no explicit path, `<state_dir>/config.toml` is used if present
    /// and defaults otherwise. An explicit path must exist.
    pub fn load(state_dir: &Path, explicit: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = state_dir.join(CONFIG_FILE);
                if !path.exists() {
                    return Ok(Self::default().with_state_dir(state_dir));
                }
                path
            }
        };

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        let config: MonitorConfig = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", config_path.display()))?;

        Ok(config.with_state_dir(state_dir))
    }

    pub fn with_state_dir(mut self, state_dir: &Path) -> Self {
        self.state_dir = state_dir.to_path_buf();
        self
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join(&self.state_file)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_secs(self.staleness_threshold_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn signal(&self) -> SignalConfig {
        SignalConfig {
            mode: self.watch,
            debounce: Duration::from_millis(self.debounce_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
        }
    }
}

/// `~/.agent-monitor`, used when neither the flag nor the env var is set
pub fn default_state_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().context("Cannot determine home directory; pass --state-dir")?;
    Ok(home.join(".agent-monitor"))
}

/// Explicit directory if given, else the default
pub fn resolve_state_dir(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir),
        None => default_state_dir(),
    }
}
