//! Publish/subscribe transport subsystem.
//!
//! # Data Flow
//! ```text
//! SubscriptionClient
//!     → open_channel(name)            → ChannelHandle
//!     → subscribe(handle, filter)     → SubscriptionStreams { events, status }
//!         events: ChangeEvent ...     (rows matching column=eq.value)
//!         status: Subscribed | Closed | Error | TimedOut
//!     → close_channel(handle)
//! ```
//!
//! # Design Decisions
//! - The transport is an injected collaborator, never a global
//! - All methods are synchronous; asynchronous outcomes arrive on the streams
//! - Implementations: in-memory broker (tests, simulator) and WebSocket

pub mod event;
pub mod memory;
pub mod protocol;
pub mod websocket;

use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

pub use event::{ChangeEvent, ChangeKind, EventFilter};
pub use memory::InMemoryTransport;
pub use websocket::WebSocketTransport;

/// Opaque reference to an opened channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    id: Uuid,
    name: String,
}

impl ChannelHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, &self.id.simple().to_string()[..8])
    }
}

/// Subscription status reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    /// The server acknowledged the subscription.
    Subscribed,
    /// The channel was closed by the server or the connection dropped.
    Closed,
    /// The server or the socket reported an error.
    Error(String),
    /// No acknowledgment arrived in time.
    TimedOut,
}

impl ChannelStatus {
    pub fn is_failure(&self) -> bool {
        !matches!(self, ChannelStatus::Subscribed)
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelStatus::Subscribed => write!(f, "subscribed"),
            ChannelStatus::Closed => write!(f, "closed"),
            ChannelStatus::Error(reason) => write!(f, "error: {}", reason),
            ChannelStatus::TimedOut => write!(f, "timed_out"),
        }
    }
}

/// Receiving halves of a live subscription.
#[derive(Debug)]
pub struct SubscriptionStreams {
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
    pub status: mpsc::UnboundedReceiver<ChannelStatus>,
}

/// Sending halves held by the transport for a live subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionSink {
    pub events: mpsc::UnboundedSender<ChangeEvent>,
    pub status: mpsc::UnboundedSender<ChannelStatus>,
}

/// Create a connected sink/stream pair.
pub fn subscription_pair() -> (SubscriptionSink, SubscriptionStreams) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = mpsc::unbounded_channel();
    (
        SubscriptionSink {
            events: events_tx,
            status: status_tx,
        },
        SubscriptionStreams {
            events: events_rx,
            status: status_rx,
        },
    )
}

/// Errors raised synchronously by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Channel names must be non-empty and free of whitespace.
    #[error("invalid channel name '{0}'")]
    InvalidChannelName(String),

    /// The handle does not refer to an open channel.
    #[error("unknown channel {0}")]
    UnknownChannel(String),

    /// The realtime endpoint URL could not be built.
    #[error("invalid realtime URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Subscribing requires a running tokio runtime.
    #[error("no tokio runtime available to drive the subscription")]
    NoRuntime,

    /// The transport refused the request.
    #[error("transport rejected request: {0}")]
    Rejected(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Minimal publish/subscribe capability the client depends on.
pub trait Transport: Send + Sync + 'static {
    /// Open a named channel. No network traffic is required yet.
    fn open_channel(&self, name: &str) -> TransportResult<ChannelHandle>;

    /// Subscribe the channel to row changes matching `filter`.
    fn subscribe(
        &self,
        handle: &ChannelHandle,
        filter: &EventFilter,
    ) -> TransportResult<SubscriptionStreams>;

    /// Close the channel. Closing an unknown handle is a no-op.
    fn close_channel(&self, handle: &ChannelHandle);
}

/// Validate a channel name the way every transport expects it.
pub fn validate_channel_name(name: &str) -> TransportResult<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(TransportError::InvalidChannelName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_names_reject_whitespace() {
        assert!(validate_channel_name("chat-42-1700000000000").is_ok());
        assert!(validate_channel_name("").is_err());
        assert!(validate_channel_name("chat 42").is_err());
    }

    #[test]
    fn status_failure_classification() {
        assert!(!ChannelStatus::Subscribed.is_failure());
        assert!(ChannelStatus::Closed.is_failure());
        assert!(ChannelStatus::TimedOut.is_failure());
        assert!(ChannelStatus::Error("boom".into()).is_failure());
    }

    #[test]
    fn handles_are_unique_per_open() {
        let a = ChannelHandle::new("chat");
        let b = ChannelHandle::new("chat");
        assert_ne!(a, b);
        assert_eq!(a.name(), "chat");
        assert!(a.to_string().starts_with("chat#"));
    }
}
