//! TCP listener with backpressure and accept backoff.
//!
//! # Responsibilities
//! - Bind to the configured address (resolving the `:gntp` service alias)
//! - Enforce max_connections via semaphore
//! - Retry transient accept errors with exponential backoff

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::config::ListenerConfig;

/// The GNTP well-known port, used when the bind address names the `gntp`
/// service instead of a port number.
pub const GNTP_PORT: u16 = 23053;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind: {0}")]
    Bind(std::io::Error),

    #[error("failed to accept: {0}")]
    Accept(std::io::Error),
}

/// A bounded TCP listener for GNTP connections.
///
/// Uses a semaphore to enforce `max_connections`: when the limit is reached,
/// `accept` waits until a slot frees up. Transient accept failures are
/// retried internally with exponential backoff, so the returned error is
/// always fatal to the accept loop.
pub struct GntpListener {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
}

impl GntpListener {
    /// Bind to the configured address with connection limits.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let addr = resolve_bind_addr(&config.bind_address);
        let listener = TcpListener::bind(&addr).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// Returns the stream, the peer address, and a permit that must be held
    /// for the connection's lifetime.
    pub async fn accept(
        &self,
    ) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        // Acquire the slot first (backpressure), then accept.
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .expect("connection semaphore closed");

        let mut delay = Duration::ZERO;
        loop {
            match self.inner.accept().await {
                Ok((stream, addr)) => {
                    tracing::debug!(peer_addr = %addr, "connection accepted");
                    return Ok((stream, addr, ConnectionPermit { _permit: permit }));
                }
                Err(e) if is_transient(&e) => {
                    delay = next_backoff(delay);
                    tracing::warn!(error = %e, retry_in = ?delay, "transient accept error");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(ListenerError::Accept(e)),
            }
        }
    }

    /// The local address this listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }
}

/// A permit representing a connection slot, released when dropped.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// Resolve the bind address, substituting the well-known GNTP port for an
/// empty address or the `gntp` service alias.
pub fn resolve_bind_addr(addr: &str) -> String {
    if addr.is_empty() {
        return format!("0.0.0.0:{}", GNTP_PORT);
    }
    if let Some(host) = addr.strip_suffix(":gntp") {
        let host = if host.is_empty() { "0.0.0.0" } else { host };
        return format!("{}:{}", host, GNTP_PORT);
    }
    addr.to_string()
}

/// Whether an accept error is worth retrying. Besides connection-level
/// resets, file-descriptor exhaustion (EMFILE/ENFILE) is transient: permits
/// free descriptors as connections finish, so backing off and retrying
/// recovers.
fn is_transient(e: &std::io::Error) -> bool {
    const ENFILE: i32 = 23;
    const EMFILE: i32 = 24;
    if matches!(e.raw_os_error(), Some(ENFILE) | Some(EMFILE)) {
        return true;
    }
    matches!(
        e.kind(),
        std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::WouldBlock
    )
}

/// Exponential backoff schedule for transient accept errors: 5 ms doubling
/// each retry, capped at 1 s.
fn next_backoff(current: Duration) -> Duration {
    const INITIAL: Duration = Duration::from_millis(5);
    const MAX: Duration = Duration::from_secs(1);
    if current.is_zero() {
        INITIAL
    } else {
        (current * 2).min(MAX)
    }
}
