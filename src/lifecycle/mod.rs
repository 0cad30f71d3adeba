//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGINT → wait_for_shutdown_signal resolves
//!
//! Shutdown (shutdown.rs):
//!     trigger → flag latched → watcher loop exits → session torn down
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
