//! GNTP Notification Daemon
//!
//! A network daemon speaking the Growl Notification Transport Protocol,
//! built with Tokio.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌────────────────────────────────────────────┐
//!                     │                  gntpd                     │
//!                     │                                            │
//!   GNTP Request      │  ┌─────────┐   ┌──────────┐   ┌─────────┐ │
//!   ──────────────────┼─▶│   net   │──▶│ protocol │──▶│handlers │ │
//!                     │  │listener │   │ mux/parse│   │REG/NOT  │ │
//!                     │  └─────────┘   └──────────┘   └────┬────┘ │
//!                     │                                    │      │
//!                     │               ┌──────────┐         ▼      │
//!                     │               │ registry │◀──┬──────────┐ │
//!                     │               └──────────┘   │  cache   │ │
//!   GNTP Response     │  ┌─────────┐   ┌──────────┐  └──────────┘ │
//!   ◀─────────────────┼──│Response │◀──│ handlers │       │      │
//!                     │  │ ::write │   │ .respond │       ▼      │
//!                     │  └─────────┘   └──────────┘  notification │
//!                     │                                  sink     │
//!                     │  ┌──────────────────────────────────────┐ │
//!                     │  │  config · lifecycle (signals, drain) │ │
//!                     │  └──────────────────────────────────────┘ │
//!                     └────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gntpd::cache::FileCache;
use gntpd::config::loader::load_config;
use gntpd::config::DaemonConfig;
use gntpd::handlers::{Notification, NotifyHandler, RegisterHandler};
use gntpd::lifecycle::signals::spawn_signal_watcher;
use gntpd::net::listener::GntpListener;
use gntpd::{Applications, DispatchTable, GntpServer, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "gntpd", about = "GNTP notification daemon", version)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Override the bind address (e.g. "127.0.0.1:23053" or ":gntp").
    #[arg(long)]
    bind: Option<String>,

    /// Override the binary cache directory.
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => DaemonConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(dir) = cli.cache_dir {
        config.cache.directory = Some(dir);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.observability.log_filter)
                }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        "configuration loaded"
    );

    let cache_dir = resolve_cache_dir(&config);
    tokio::fs::create_dir_all(&cache_dir).await?;
    probe_writable(&cache_dir).await?;
    tracing::info!(cache_dir = %cache_dir.display(), "binary cache ready");
    let cache = Arc::new(FileCache::new(cache_dir));

    let apps = Applications::new();
    let (sink, mut notifications) = tokio::sync::mpsc::unbounded_channel::<Notification>();

    // Display consumer. Disabled notification types are accepted on the
    // wire but suppressed here.
    tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            if !notification.enabled {
                tracing::debug!(
                    application = %notification.application,
                    notification = %notification.name,
                    "notification suppressed (disabled by user)"
                );
                continue;
            }
            tracing::info!(
                application = %notification.application,
                notification = %notification.name,
                title = %notification.title,
                text = %notification.text,
                sticky = notification.sticky,
                priority = notification.priority,
                "notification"
            );
        }
    });

    let mux = Arc::new(DispatchTable::new());
    mux.register(
        "REGISTER",
        Arc::new(RegisterHandler::new(
            apps.clone(),
            Arc::clone(&cache),
            config.cache.download_icons,
        )),
    );
    mux.register(
        "NOTIFY",
        Arc::new(NotifyHandler::new(
            apps,
            sink,
            Arc::clone(&cache),
            config.cache.download_icons,
        )),
    );

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_watcher(Arc::clone(&shutdown));

    let listener = GntpListener::bind(&config.listener).await?;
    let server = GntpServer::new(mux, shutdown);
    server.run(listener).await?;

    Ok(())
}

/// Cache directory precedence: config (CLI override already applied), the
/// per-user cache directory, the system temp directory.
fn resolve_cache_dir(config: &DaemonConfig) -> PathBuf {
    if let Some(dir) = &config.cache.directory {
        return dir.clone();
    }
    dirs::cache_dir()
        .map(|d| d.join("gntpd"))
        .unwrap_or_else(|| std::env::temp_dir().join("gntpd"))
}

/// Fail fast at startup if the cache directory cannot be written to.
async fn probe_writable(dir: &std::path::Path) -> std::io::Result<()> {
    let probe = dir.join(format!(".probe-{}", std::process::id()));
    tokio::fs::write(&probe, b"").await.map_err(|e| {
        std::io::Error::new(
            e.kind(),
            format!("cache directory {} not writable: {}", dir.display(), e),
        )
    })?;
    tokio::fs::remove_file(&probe).await
}
