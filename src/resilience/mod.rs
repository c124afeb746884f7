//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Channel failure (closed / error / timed_out / subscribe error):
//!     → backoff.rs (RetryState::next against the BackoffPolicy)
//!     → Retry { attempt, delay } → timer.rs (RetryTimer owned by the client)
//!     → Exhausted                 → no timer, reported once to the listener
//! ```
//!
//! # Design Decisions
//! - All transport failures take the same path, no special-casing by kind
//! - Delays grow geometrically and are capped; jitter is opt-in
//! - A retry timer is owned, never detached, so teardown cancels it

pub mod backoff;
pub mod timer;

pub use backoff::{BackoffPolicy, RetryDecision, RetryState};
pub use timer::RetryTimer;
