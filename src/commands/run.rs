use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use crate::airports::MetroIndex;
use crate::config::Config;
use crate::db::DbPool;

/// Run the polling scheduler until SIGINT/SIGTERM.
pub async fn handle_run(config: Config, pool: DbPool, index: Arc<MetroIndex>) -> Result<()> {
    let scheduler = super::build_scheduler(&config, pool, index);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    error!("Failed to register SIGTERM handler: {e}");
                    return;
                }
            };
            let mut sigint = match signal(SignalKind::interrupt()) {
                Ok(sigint) => sigint,
                Err(e) => {
                    error!("Failed to register SIGINT handler: {e}");
                    return;
                }
            };

            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                _ = sigint.recv() => info!("Received SIGINT (Ctrl+C), shutting down..."),
            }
        }

        #[cfg(not(unix))]
        {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received SIGINT (Ctrl+C), shutting down..."),
                Err(e) => {
                    error!("Failed to listen for SIGINT signal: {e}");
                    return;
                }
            }
        }

        let _ = shutdown_tx.send(());
    });

    scheduler.run(shutdown_rx).await
}
