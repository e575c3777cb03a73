//! Server runtime: HTTP listener, change-signal pump, staleness ticker

use super::http::{self, AppState};
use crate::config::MonitorConfig;
use crate::ingest::Ingestor;
use crate::monitor::{refresh_blocking, Broadcaster, StalenessMonitor};
use crate::signal::{open_signal, ChangeSignal};
use crate::store::StateStore;
use crate::Result;
use anyhow::Context;
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Bind the loopback listener for `config.port`
pub async fn bind(config: &MonitorConfig) -> Result<TcpListener> {
    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))
}

/// Run until Ctrl-C
pub async fn run(config: MonitorConfig, listener: TcpListener) -> Result<()> {
    let store = Arc::new(StateStore::new(config.state_path()));
    let ingestor = Arc::new(Ingestor::from_config(Arc::clone(&store), &config));
    let broadcaster = Arc::new(
        Broadcaster::new(Arc::clone(&store))
            .with_threshold(config.staleness_threshold())
            .with_buffer(config.viewer_buffer),
    );

    let signal = open_signal(&config.state_path(), &config.signal())
        .context("Failed to watch state file")?;
    let pump = spawn_pump(signal, Arc::clone(&broadcaster));
    let _staleness = StalenessMonitor::spawn(Arc::clone(&broadcaster), config.tick_interval());

    info!(
        addr = %listener.local_addr()?,
        state = %config.state_path().display(),
        "monitor running"
    );

    let closing = Arc::clone(&broadcaster);
    http::serve(listener, AppState::new(ingestor, broadcaster), async move {
        shutdown_signal().await;
        // Open streams would otherwise hold graceful shutdown forever
        closing.close();
    })
    .await?;

    pump.abort();
    info!("monitor stopped");
    Ok(())
}

/// Forward every change firing to the broadcaster
fn spawn_pump(mut signal: Box<dyn ChangeSignal>, broadcaster: Arc<Broadcaster>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while signal.changed().await {
            let refresh = refresh_blocking(&broadcaster, Utc::now()).await;
            debug!(delivered = refresh.delivered, viewers = refresh.viewers, "state changed");
        }
        warn!(signal = signal.kind().as_str(), "change signal ended");
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
