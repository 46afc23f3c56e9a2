//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the daemon.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the notification daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DaemonConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Binary cache settings.
    pub cache: CacheConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:23053"). The port may be given as the
    /// service name `gntp`, and an empty string binds the well-known port
    /// on all interfaces.
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:23053".to_string(),
            max_connections: 1024,
        }
    }
}

/// Binary cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory for cached binary sections and downloaded icons.
    /// Defaults to a per-user cache directory when unset.
    pub directory: Option<PathBuf>,

    /// Whether to fetch icons referenced by URL in the background.
    pub download_icons: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            download_icons: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive (overridden by the `RUST_LOG` environment
    /// variable when set).
    pub log_filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "gntpd=info".to_string(),
        }
    }
}
