use crate::config::MonitorConfig;
use crate::server;
use crate::Result;
use colored::Colorize;

pub async fn run(config: MonitorConfig) -> Result<()> {
    let listener = server::bind(&config).await?;
    let addr = listener.local_addr()?;

    println!("{}", format!("✓ Monitor listening on http://{}", addr).green());
    println!("  State file: {}", config.state_path().display());
    println!("  Snapshot:   http://{}/api/state", addr);
    println!("  Stream:     http://{}/api/stream", addr);

    server::run(config, listener).await
}
