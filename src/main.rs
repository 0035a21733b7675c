//! cursord - query cursor server
//!
//! Starts a cluster of coordinators sharing one cursor store, plus the
//! background sweep that expires idle cursors.
//!
//! # Usage
//!
//! ```bash
//! # Two coordinators on ports 8529 and 8530
//! cursord --coordinators 2 --base-port 8529
//!
//! # Inspect the effective configuration
//! cursord config --show
//! ```

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cursord::cli::CliInterface;
use cursord::coordinator::{Cluster, ClusterState};
use cursord::cursor::spawn_sweeper;
use cursord::error::Result;

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle subcommands or start the cluster
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    initialize_logging(&cli);

    if cli.handle_subcommand()? {
        return Ok(());
    }

    serve(&cli).await
}

/// Run the coordinators and the sweeper until Ctrl+C
async fn serve(cli: &CliInterface) -> Result<()> {
    let config = cli.config();
    if config.users.is_empty() {
        warn!("No users configured; every request will be rejected as unauthenticated");
    }

    let state = Arc::new(ClusterState::new(config));
    let cluster = Cluster::with_state(config, state.clone());
    let cancel = CancellationToken::new();

    let sweeper = spawn_sweeper(
        state.store().clone(),
        config.sweep_interval(),
        cancel.clone(),
    );

    let shutdown = cancel.clone();
    let ctrl_c = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutting down");
                shutdown.cancel();
            }
            Err(err) => error!("Failed to listen for Ctrl+C: {}", err),
        }
    });

    info!(
        "Starting {} coordinator(s), cursor ttl {}s",
        cluster.coordinators().len(),
        config.cursor.ttl
    );
    let outcome = cluster.serve(cancel.clone()).await;

    cancel.cancel();
    ctrl_c.abort();
    if let Err(e) = sweeper.await {
        warn!("Sweeper task ended abnormally: {}", e);
    }
    outcome
}

/// Initialize logging system based on verbosity level
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
fn initialize_logging(cli: &CliInterface) {
    let level = cli.config().logging.level.to_tracing_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
