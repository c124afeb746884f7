//! In-process broker implementing [`Transport`].
//!
//! # Responsibilities
//! - Route published change events to matching subscriptions
//! - Inject status signals (closed, error, timeout) on demand
//! - Script subscribe outcomes and failing opens
//! - Keep a ledger of opens/closes for assertions
//!
//! Used by the integration tests and the `realtime-sim` binary.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::time::Instant;
use uuid::Uuid;

use crate::transport::{
    subscription_pair, validate_channel_name, ChangeEvent, ChannelHandle, ChannelStatus,
    EventFilter, SubscriptionSink, SubscriptionStreams, Transport, TransportError,
    TransportResult,
};

/// What the broker does when a channel subscribes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Acknowledge immediately.
    Ack,
    /// Emit the given status instead of an acknowledgment.
    Fail(ChannelStatus),
    /// Emit nothing; the test drives the status by hand.
    Silent,
    /// Fail synchronously with [`TransportError::Rejected`].
    Reject(String),
}

/// A channel open recorded by the broker.
#[derive(Debug, Clone)]
pub struct OpenRecord {
    pub name: String,
    pub at: Instant,
}

struct MemoryChannel {
    handle: ChannelHandle,
    filter: Option<EventFilter>,
    sink: Option<SubscriptionSink>,
}

struct Inner {
    channels: DashMap<Uuid, MemoryChannel>,
    opens: Mutex<Vec<OpenRecord>>,
    closes: AtomicUsize,
    script: Mutex<VecDeque<SubscribeOutcome>>,
    failing_opens: AtomicU32,
    auto_ack: AtomicBool,
}

/// Cloneable handle to a shared in-memory broker.
#[derive(Clone)]
pub struct InMemoryTransport {
    inner: Arc<Inner>,
}

impl InMemoryTransport {
    /// Create a broker that acknowledges every subscription.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                channels: DashMap::new(),
                opens: Mutex::new(Vec::new()),
                closes: AtomicUsize::new(0),
                script: Mutex::new(VecDeque::new()),
                failing_opens: AtomicU32::new(0),
                auto_ack: AtomicBool::new(true),
            }),
        }
    }

    /// Queue outcomes for the next subscriptions, consumed in order.
    pub fn script<I>(&self, outcomes: I)
    where
        I: IntoIterator<Item = SubscribeOutcome>,
    {
        let mut script = self.inner.script.lock().unwrap_or_else(|e| e.into_inner());
        script.extend(outcomes);
    }

    /// Outcome used once the script is drained: `Ack` when true, `Silent` otherwise.
    pub fn set_auto_ack(&self, enabled: bool) {
        self.inner.auto_ack.store(enabled, Ordering::SeqCst);
    }

    /// Make the next `n` calls to `open_channel` fail.
    pub fn fail_next_opens(&self, n: u32) {
        self.inner.failing_opens.store(n, Ordering::SeqCst);
    }

    /// Publish a change event to every subscription whose filter matches.
    ///
    /// Returns the number of subscriptions that received it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let mut delivered = 0;
        for channel in self.inner.channels.iter() {
            let (Some(filter), Some(sink)) = (&channel.filter, &channel.sink) else {
                continue;
            };
            if filter.matches(&event) && sink.events.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Push a status signal to every live subscription.
    pub fn emit_status(&self, status: ChannelStatus) -> usize {
        let mut notified = 0;
        for channel in self.inner.channels.iter() {
            if let Some(sink) = &channel.sink {
                if sink.status.send(status.clone()).is_ok() {
                    notified += 1;
                }
            }
        }
        notified
    }

    /// Drop the sending halves of every subscription, ending their streams.
    pub fn drop_streams(&self) {
        for mut channel in self.inner.channels.iter_mut() {
            channel.sink = None;
        }
    }

    pub fn open_count(&self) -> usize {
        self.opens().len()
    }

    pub fn close_count(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    /// Channels currently open (opened and not yet closed).
    pub fn live_channels(&self) -> usize {
        self.inner.channels.len()
    }

    /// Every open, in order.
    pub fn opens(&self) -> Vec<OpenRecord> {
        self.inner
            .opens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Filters of the currently subscribed channels.
    pub fn active_filters(&self) -> Vec<EventFilter> {
        self.inner
            .channels
            .iter()
            .filter_map(|c| c.filter.clone())
            .collect()
    }

    fn next_outcome(&self) -> SubscribeOutcome {
        let mut script = self.inner.script.lock().unwrap_or_else(|e| e.into_inner());
        script.pop_front().unwrap_or_else(|| {
            if self.inner.auto_ack.load(Ordering::SeqCst) {
                SubscribeOutcome::Ack
            } else {
                SubscribeOutcome::Silent
            }
        })
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for InMemoryTransport {
    fn open_channel(&self, name: &str) -> TransportResult<ChannelHandle> {
        validate_channel_name(name)?;

        let failing = self
            .inner
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(TransportError::Rejected(format!(
                "open of '{}' refused",
                name
            )));
        }

        let handle = ChannelHandle::new(name);
        self.inner
            .opens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(OpenRecord {
                name: name.to_string(),
                at: Instant::now(),
            });
        self.inner.channels.insert(
            handle.id(),
            MemoryChannel {
                handle: handle.clone(),
                filter: None,
                sink: None,
            },
        );
        tracing::trace!(channel = %handle, "Memory channel opened");
        Ok(handle)
    }

    fn subscribe(
        &self,
        handle: &ChannelHandle,
        filter: &EventFilter,
    ) -> TransportResult<SubscriptionStreams> {
        let mut channel = self
            .inner
            .channels
            .get_mut(&handle.id())
            .ok_or_else(|| TransportError::UnknownChannel(handle.to_string()))?;

        let outcome = self.next_outcome();
        if let SubscribeOutcome::Reject(reason) = outcome {
            return Err(TransportError::Rejected(reason));
        }

        let (sink, streams) = subscription_pair();
        match outcome {
            SubscribeOutcome::Ack => {
                let _ = sink.status.send(ChannelStatus::Subscribed);
            }
            SubscribeOutcome::Fail(status) => {
                let _ = sink.status.send(status);
            }
            SubscribeOutcome::Silent | SubscribeOutcome::Reject(_) => {}
        }
        channel.filter = Some(filter.clone());
        channel.sink = Some(sink);
        tracing::trace!(channel = %channel.handle, filter = %filter.expression(), "Memory channel subscribed");
        Ok(streams)
    }

    fn close_channel(&self, handle: &ChannelHandle) {
        if self.inner.channels.remove(&handle.id()).is_some() {
            self.inner.closes.fetch_add(1, Ordering::SeqCst);
            tracing::trace!(channel = %handle, "Memory channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChangeKind;
    use serde_json::json;

    fn filter(value: &str) -> EventFilter {
        EventFilter {
            schema: "public".into(),
            table: "messages".into(),
            column: "session_id".into(),
            value: value.into(),
            event: ChangeKind::All,
        }
    }

    #[tokio::test]
    async fn subscribe_acknowledges_by_default() {
        let broker = InMemoryTransport::new();
        let handle = broker.open_channel("chat-1").unwrap();
        let mut streams = broker.subscribe(&handle, &filter("s1")).unwrap();
        assert_eq!(streams.status.recv().await, Some(ChannelStatus::Subscribed));
        assert_eq!(broker.open_count(), 1);
        assert_eq!(broker.live_channels(), 1);
    }

    #[tokio::test]
    async fn publish_routes_by_filter() {
        let broker = InMemoryTransport::new();
        let h1 = broker.open_channel("chat-1").unwrap();
        let h2 = broker.open_channel("chat-2").unwrap();
        let mut s1 = broker.subscribe(&h1, &filter("s1")).unwrap();
        let _s2 = broker.subscribe(&h2, &filter("s2")).unwrap();

        let delivered = broker.publish(ChangeEvent::insert(
            "messages",
            json!({"id": "m1", "session_id": "s1"}),
        ));
        assert_eq!(delivered, 1);
        let event = s1.events.recv().await.unwrap();
        assert_eq!(event.message_id("id").as_deref(), Some("m1"));
    }

    #[tokio::test]
    async fn scripted_outcomes_are_consumed_in_order() {
        let broker = InMemoryTransport::new();
        broker.script([
            SubscribeOutcome::Fail(ChannelStatus::TimedOut),
            SubscribeOutcome::Reject("nope".into()),
        ]);

        let h = broker.open_channel("chat").unwrap();
        let mut s = broker.subscribe(&h, &filter("s")).unwrap();
        assert_eq!(s.status.recv().await, Some(ChannelStatus::TimedOut));

        let h = broker.open_channel("chat").unwrap();
        assert!(matches!(
            broker.subscribe(&h, &filter("s")),
            Err(TransportError::Rejected(_))
        ));

        let h = broker.open_channel("chat").unwrap();
        let mut s = broker.subscribe(&h, &filter("s")).unwrap();
        assert_eq!(s.status.recv().await, Some(ChannelStatus::Subscribed));
    }

    #[test]
    fn failing_opens_are_counted_down() {
        let broker = InMemoryTransport::new();
        broker.fail_next_opens(2);
        assert!(broker.open_channel("chat").is_err());
        assert!(broker.open_channel("chat").is_err());
        assert!(broker.open_channel("chat").is_ok());
        assert_eq!(broker.open_count(), 1);
    }

    #[test]
    fn close_is_idempotent() {
        let broker = InMemoryTransport::new();
        let h = broker.open_channel("chat").unwrap();
        broker.close_channel(&h);
        broker.close_channel(&h);
        assert_eq!(broker.close_count(), 1);
        assert_eq!(broker.live_channels(), 0);
    }

    #[test]
    fn malformed_name_is_rejected() {
        let broker = InMemoryTransport::new();
        assert!(matches!(
            broker.open_channel("bad name"),
            Err(TransportError::InvalidChannelName(_))
        ));
        assert_eq!(broker.open_count(), 0);
    }
}
