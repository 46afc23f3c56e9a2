//! OS signal handling.
//!
//! # Responsibilities
//! - Translate SIGINT into a graceful shutdown trigger
//! - Force exit on a second SIGINT or when the clean exit deadline passes
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Graceful shutdown gets 15 seconds before the process is killed

use std::sync::Arc;
use std::time::Duration;

use crate::lifecycle::Shutdown;

/// How long a graceful shutdown may take before the process is forced out.
const FORCED_EXIT_DEADLINE: Duration = Duration::from_secs(15);

/// Spawn the signal watcher task.
pub fn spawn_signal_watcher(shutdown: Arc<Shutdown>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::error!("could not install interrupt handler");
            return;
        }
        tracing::info!("interrupt received, shutting down");
        shutdown.trigger();

        tokio::spawn(async {
            tokio::time::sleep(FORCED_EXIT_DEADLINE).await;
            tracing::error!("clean exit timed out, forcing");
            std::process::exit(1);
        });

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("second interrupt, forcing exit");
            std::process::exit(1);
        }
    });
}
