//! `agent-monitor hook`: one host notification from stdin
//!
//! Whatever happens here, the host sees a clean exit.

use crate::config::MonitorConfig;
use crate::ingest::{Ingestor, Outcome};
use crate::store::StateStore;
use crate::Result;
use std::io::{self, Read};
use std::sync::Arc;
use tracing::{debug, warn};

pub fn run(config: &MonitorConfig) -> Result<()> {
    let mut raw = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut raw) {
        warn!(error = %e, "failed to read notification from stdin");
        return Ok(());
    }

    let outcome = handle(config, &raw);
    debug!(?outcome, "hook handled");
    Ok(())
}

/// Apply one raw payload against the configured state file
pub fn handle(config: &MonitorConfig, raw: &str) -> Outcome {
    let store = Arc::new(StateStore::new(config.state_path()));
    Ingestor::from_config(store, config).handle_raw(raw)
}
