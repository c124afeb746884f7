//! Message delivery subsystem.
//!
//! # Data Flow
//! ```text
//! ChangeEvent from transport
//!     → message_id(id_field)
//!     → dedup.rs (seen before? drop)
//!     → queue.rs (hold for the fixed delivery delay)
//!     → SubscriptionListener::on_message
//! ```
//!
//! # Design Decisions
//! - Identifiers are admitted at receipt time, not at delivery time
//! - Events without an identifier bypass dedup
//! - One constant delay for every message keeps relative order

pub mod dedup;
pub mod queue;

pub use dedup::MessageDeduplicator;
pub use queue::DelayedQueue;
