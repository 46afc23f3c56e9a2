//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use gntpd::cache::FileCache;
use gntpd::config::ListenerConfig;
use gntpd::handlers::{Notification, NotifyHandler, RegisterHandler};
use gntpd::net::listener::GntpListener;
use gntpd::{Applications, DispatchTable, GntpServer, Shutdown};

/// A fully wired daemon on an ephemeral port, plus the handles the tests
/// need to observe and stop it.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Arc<Shutdown>,
    pub notifications: mpsc::UnboundedReceiver<Notification>,
    pub cache_dir: tempfile::TempDir,
    pub server: JoinHandle<()>,
}

pub async fn start_server() -> TestServer {
    let cache_dir = tempfile::tempdir().unwrap();
    let cache = Arc::new(FileCache::new(cache_dir.path()));
    let apps = Applications::new();
    let (sink, notifications) = mpsc::unbounded_channel();

    let mux = Arc::new(DispatchTable::new());
    mux.register(
        "REGISTER",
        Arc::new(RegisterHandler::new(apps.clone(), Arc::clone(&cache), false)),
    );
    mux.register(
        "NOTIFY",
        Arc::new(NotifyHandler::new(apps, sink, cache, false)),
    );

    let listener = GntpListener::bind(&ListenerConfig {
        bind_address: "127.0.0.1:0".to_string(),
        max_connections: 16,
    })
    .await
    .unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Arc::new(Shutdown::new());
    let server = GntpServer::new(mux, Arc::clone(&shutdown));
    let server = tokio::spawn(async move {
        server.run(listener).await.unwrap();
    });

    TestServer {
        addr,
        shutdown,
        notifications,
        cache_dir,
        server,
    }
}

/// Send raw request bytes and collect the complete response as text.
pub async fn send_request(addr: SocketAddr, request: &[u8]) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8(response).unwrap()
}
