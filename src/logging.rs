//! Tracing subscriber setup
//!
//! Logs go to stderr so `status --json` and `schema` keep stdout clean, and
//! so hook output never reaches the host.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "AGENT_MONITOR_LOG";

/// Install the global subscriber
///
/// `AGENT_MONITOR_LOG` overrides `default_directives`. Calling this twice is
/// harmless; the second call is ignored.
pub fn init(default_directives: &str) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
