//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Exit requested → stop accepting → drain connections → return
//!
//! Signals (signals.rs):
//!     SIGINT → trigger graceful shutdown
//!     second SIGINT or 15 s deadline → forced exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
