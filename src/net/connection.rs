//! Connection lifecycle.
//!
//! # Responsibilities
//! - Track in-flight connections for graceful shutdown (atomic counter,
//!   RAII guard, drain-wait)
//! - Drive exactly one request/response exchange per accepted socket
//! - Confine panics and faults to the connection they occur on

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;

use crate::net::listener::ConnectionPermit;
use crate::protocol::error::ServeError;
use crate::protocol::{GntpError, Handler, Request, Response};

/// Global atomic counter for connection IDs. Relaxed ordering is enough;
/// only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection, used in log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Tracks in-flight connections so shutdown can wait for drainage.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new in-flight connection. The returned guard decrements the
    /// count on drop, on both the normal and the panic path.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until every tracked connection has completed.
    pub async fn wait_for_drain(&self) {
        while self.active_count.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        }
    }
}

/// Guard for one in-flight connection; decrements the count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "connection closed");
    }
}

/// Serve one connection: parse, respond, write, close.
///
/// Any panic inside the exchange is caught here, logged, and ends this
/// connection only; the guard and permit are released either way.
pub(crate) async fn serve(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<dyn Handler>,
    guard: ConnectionGuard,
    permit: ConnectionPermit,
) {
    let id = guard.id();
    let exchange = AssertUnwindSafe(serve_exchange(stream, peer_addr, handler, id)).catch_unwind();
    if let Err(panic) = exchange.await {
        let message = panic_message(&panic);
        tracing::error!(
            connection_id = %id,
            peer_addr = %peer_addr,
            panic = %message,
            "panic serving connection"
        );
    }
    drop(permit);
    drop(guard);
}

/// One request/response exchange over a buffered reader/writer pair.
async fn serve_exchange(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<dyn Handler>,
    id: ConnectionId,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);

    let mut request = Request::default();
    let response = match handler.parse(&mut reader, &mut request).await {
        Ok(()) => {
            tracing::debug!(
                connection_id = %id,
                request_type = %request.request_type,
                "request parsed"
            );
            match handler.respond(&request).await {
                Ok(resp) => resp,
                Err(e) => substitute(e, id, peer_addr, "could not build response"),
            }
        }
        Err(e) => substitute(e, id, peer_addr, "could not parse request"),
    };

    if let Err(e) = write_response(&mut writer, &response).await {
        tracing::debug!(connection_id = %id, error = %e, "could not write response");
    }
}

/// Protocol errors answer with their own wire response; anything else is
/// logged and becomes the generic 500 response.
fn substitute(err: ServeError, id: ConnectionId, peer_addr: SocketAddr, context: &str) -> Response {
    match err {
        ServeError::Protocol(e) => {
            tracing::debug!(
                connection_id = %id,
                peer_addr = %peer_addr,
                code = e.code(),
                error = %e,
                "request failed"
            );
            e.response()
        }
        ServeError::Io(e) => {
            tracing::error!(
                connection_id = %id,
                peer_addr = %peer_addr,
                error = %e,
                "{}", context
            );
            GntpError::Internal.response()
        }
    }
}

async fn write_response<W>(writer: &mut W, response: &Response) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    response.write(writer).await?;
    writer.flush().await?;
    writer.shutdown().await
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn tracker_counts_guards() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        assert_eq!(tracker.active_count(), 1);

        let guard2 = tracker.track();
        assert_eq!(tracker.active_count(), 2);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn drain_returns_once_guards_release() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.track();

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_for_drain().await })
        };
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(tokio::time::Duration::from_secs(1), waiter)
            .await
            .expect("drain did not complete")
            .unwrap();
    }
}
