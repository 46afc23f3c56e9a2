//! Accept loop and graceful shutdown orchestration.
//!
//! # Data Flow
//! `run` selects between the shutdown signal and the listener. Each accepted
//! socket is tracked and served on its own task. When shutdown triggers, the
//! listener is dropped first so new connections are refused, then the tracker
//! drains in-flight exchanges before `run` returns.

use std::sync::Arc;

use crate::lifecycle::Shutdown;
use crate::net::connection::{self, ConnectionTracker};
use crate::net::listener::{GntpListener, ListenerError};
use crate::protocol::Handler;

/// The GNTP server: one handler, one tracker, one shutdown coordinator.
pub struct GntpServer {
    handler: Arc<dyn Handler>,
    tracker: ConnectionTracker,
    shutdown: Arc<Shutdown>,
}

impl GntpServer {
    pub fn new(handler: Arc<dyn Handler>, shutdown: Arc<Shutdown>) -> Self {
        Self {
            handler,
            tracker: ConnectionTracker::new(),
            shutdown,
        }
    }

    /// Accept and serve connections until shutdown triggers, then drain.
    pub async fn run(&self, listener: GntpListener) -> Result<(), ListenerError> {
        if let Ok(local_addr) = listener.local_addr() {
            tracing::info!(bind_addr = %local_addr, "listening");
        }

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer_addr, permit)) => {
                            let guard = self.tracker.track();
                            let handler = Arc::clone(&self.handler);
                            tracing::debug!(
                                connection_id = %guard.id(),
                                peer_addr = %peer_addr,
                                "connection accepted"
                            );
                            tokio::spawn(connection::serve(
                                stream, peer_addr, handler, guard, permit,
                            ));
                        }
                        Err(e) => {
                            if self.shutdown.is_triggered() {
                                break;
                            }
                            return Err(e);
                        }
                    }
                }
            }
        }

        // Refuse new connections before waiting on the ones in flight.
        drop(listener);
        let active = self.tracker.active_count();
        if active > 0 {
            tracing::info!(active_connections = active, "draining connections");
        }
        self.tracker.wait_for_drain().await;
        tracing::info!("server stopped");
        Ok(())
    }

    /// Signal the accept loop to stop. Idempotent.
    pub fn exit(&self) {
        self.shutdown.trigger();
    }
}
