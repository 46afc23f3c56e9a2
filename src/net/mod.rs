//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept, connection limit, transient-error backoff)
//!     → connection.rs (in-flight tracking, one request/response exchange)
//!     → server.rs (accept loop, shutdown, drain)
//! ```
//!
//! # Design Decisions
//! - One task per connection; the accept loop never blocks on a connection
//! - Each connection is tracked so shutdown can wait for drainage
//! - Panics are confined to the connection they occur on

pub mod connection;
pub mod listener;
pub mod server;
