// Agent Monitor - live view of an agent session's work units
// Ingests host lifecycle notifications into one state document and pushes
// decorated snapshots to local viewers.

pub mod cli;
pub mod config;
pub mod ingest;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod server;
pub mod signal;
pub mod store;

pub use anyhow::{Context, Result};
pub use colored::Colorize;

// Re-export commonly used types
pub use config::MonitorConfig;
pub use ingest::{Ingestor, Notification, NotificationKind, Outcome};
pub use models::{AgentRecord, CanonicalState, DisplayState, SessionState, Stats};
pub use monitor::{Broadcaster, StalenessMonitor};
pub use store::StateStore;
