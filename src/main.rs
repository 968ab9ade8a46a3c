//! sandbox-server: scans and quarantines local files on request
//!
//! Features:
//! - Signature scanning of local files
//! - Atomic quarantine moves
//! - Configuration via CLI arguments or TOML file

use sandbox_server::server::run_until_interrupted;
use sandbox_server::{Config, Server};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        threads = config.threads,
        quarantine_dir = %config.quarantine_dir.display(),
        "Starting sandbox server"
    );

    let server = Server::bind(&config)?;

    // First Ctrl-C stops accepting, a second one exits without waiting
    // for idle clients
    run_until_interrupted(server, || async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for interrupt");
            std::future::pending::<()>().await;
        }
        info!("Keyboard interrupt");
    })
    .await?;

    Ok(())
}
