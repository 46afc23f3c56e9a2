//! GNTP Notification Daemon Library

pub mod cache;
pub mod config;
pub mod handlers;
pub mod lifecycle;
pub mod net;
pub mod protocol;
pub mod registry;

pub use config::schema::DaemonConfig;
pub use handlers::{Notification, NotifyHandler, RegisterHandler};
pub use lifecycle::Shutdown;
pub use net::server::GntpServer;
pub use protocol::DispatchTable;
pub use registry::Applications;
