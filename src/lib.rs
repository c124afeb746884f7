//! Resilient realtime subscriptions for session-scoped chat channels.
//!
//! A [`SubscriptionClient`] keeps one channel subscribed to the row changes
//! of a session, reconnects with capped exponential backoff when the channel
//! drops, delivers each message identifier at most once, and reports
//! connection status changes to a [`SubscriptionListener`].

pub mod client;
pub mod config;
pub mod delivery;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod transport;

pub use client::{
    ClientOptions, ConnectionState, SubscriptionClient, SubscriptionListener,
};
pub use config::RelayConfig;
pub use lifecycle::Shutdown;
pub use resilience::BackoffPolicy;
pub use transport::{InMemoryTransport, Transport, WebSocketTransport};
