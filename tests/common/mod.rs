//! Shared utilities for the client integration tests.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use session_realtime::client::{ChannelListener, ClientOptions, ListenerEvent, SubscriptionClient};
use session_realtime::transport::memory::InMemoryTransport;
use session_realtime::transport::ChangeEvent;

pub const SESSION: &str = "session-1";

/// A client wired to an in-memory broker, with its callbacks recorded.
pub struct Harness {
    pub broker: InMemoryTransport,
    pub client: SubscriptionClient,
    events: mpsc::UnboundedReceiver<ListenerEvent>,
}

impl Harness {
    pub fn start(options: ClientOptions) -> Self {
        Self::with_broker(InMemoryTransport::new(), options)
    }

    /// Start against a broker that was scripted beforehand.
    pub fn with_broker(broker: InMemoryTransport, options: ClientOptions) -> Self {
        let (listener, events) = ChannelListener::new();
        let client = SubscriptionClient::spawn(Arc::new(broker.clone()), options, listener);
        Self {
            broker,
            client,
            events,
        }
    }

    /// Everything the listener received since the last call.
    pub fn drain(&mut self) -> Vec<ListenerEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            seen.push(event);
        }
        seen
    }

    /// Stop the client and return whatever the listener received.
    #[allow(dead_code)]
    pub async fn stop(self) -> Vec<ListenerEvent> {
        let Harness {
            client, mut events, ..
        } = self;
        client.shutdown().await;
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }
}

/// Options for [`SESSION`] with a short, deterministic retry schedule.
#[allow(dead_code)]
pub fn options(retry_limit: u32, retry_delay_ms: u64) -> ClientOptions {
    ClientOptions::for_session(SESSION)
        .with_retry_limit(retry_limit)
        .with_retry_delay(Duration::from_millis(retry_delay_ms))
}

/// Insert on the default `messages` table.
#[allow(dead_code)]
pub fn message(session: &str, id: &str) -> ChangeEvent {
    ChangeEvent::insert(
        "messages",
        json!({ "id": id, "session_id": session, "content": format!("body of {id}") }),
    )
}

/// Let the driver task catch up without moving the paused clock far.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Ids of the delivered messages, in delivery order.
#[allow(dead_code)]
pub fn message_ids(events: &[ListenerEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ListenerEvent::Message(event) => event.message_id("id"),
            ListenerEvent::ConnectionChanged(_) => None,
        })
        .collect()
}

/// Connection status callbacks, in order.
#[allow(dead_code)]
pub fn statuses(events: &[ListenerEvent]) -> Vec<bool> {
    events
        .iter()
        .filter_map(|e| match e {
            ListenerEvent::ConnectionChanged(connected) => Some(*connected),
            ListenerEvent::Message(_) => None,
        })
        .collect()
}
