//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger(Signal)
//!
//! Shutdown (shutdown.rs):
//!     trigger → every wait() resolves, including ones started later
//!     → binaries shut their SubscriptionClient down and exit
//! ```
//!
//! # Design Decisions
//! - One watch-backed coordinator, cloned into every long-running task
//! - Config reload is driven by the file watcher, not by SIGHUP

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownReason};
