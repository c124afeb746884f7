//! Consumer callbacks.

use tokio::sync::mpsc;

use crate::transport::ChangeEvent;

/// Receives deliveries and connection status changes from the client.
///
/// Called from the client's driver task; implementations should not block.
pub trait SubscriptionListener: Send + 'static {
    /// A message seen for the first time.
    fn on_message(&mut self, event: ChangeEvent);

    /// The boolean connection status changed, or retries were exhausted.
    fn on_connection_change(&mut self, connected: bool);
}

/// Listener built from two closures.
pub struct FnListener<M, C> {
    on_message: M,
    on_connection_change: C,
}

/// Build a listener from an `on_message` and an `on_connection_change` closure.
pub fn listener_fn<M, C>(on_message: M, on_connection_change: C) -> FnListener<M, C>
where
    M: FnMut(ChangeEvent) + Send + 'static,
    C: FnMut(bool) + Send + 'static,
{
    FnListener {
        on_message,
        on_connection_change,
    }
}

impl<M, C> SubscriptionListener for FnListener<M, C>
where
    M: FnMut(ChangeEvent) + Send + 'static,
    C: FnMut(bool) + Send + 'static,
{
    fn on_message(&mut self, event: ChangeEvent) {
        (self.on_message)(event)
    }

    fn on_connection_change(&mut self, connected: bool) {
        (self.on_connection_change)(connected)
    }
}

/// Everything a [`ChannelListener`] forwards.
#[derive(Debug, Clone, PartialEq)]
pub enum ListenerEvent {
    Message(ChangeEvent),
    ConnectionChanged(bool),
}

/// Listener that forwards callbacks into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<ListenerEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ListenerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl SubscriptionListener for ChannelListener {
    fn on_message(&mut self, event: ChangeEvent) {
        let _ = self.tx.send(ListenerEvent::Message(event));
    }

    fn on_connection_change(&mut self, connected: bool) {
        let _ = self.tx.send(ListenerEvent::ConnectionChanged(connected));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn closures_receive_callbacks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let status = Arc::new(Mutex::new(Vec::new()));
        let (s1, s2) = (seen.clone(), status.clone());
        let mut listener = listener_fn(
            move |e: ChangeEvent| s1.lock().unwrap().push(e.message_id("id")),
            move |c| s2.lock().unwrap().push(c),
        );

        listener.on_message(ChangeEvent::insert("messages", json!({"id": "m1"})));
        listener.on_connection_change(true);

        assert_eq!(*seen.lock().unwrap(), vec![Some("m1".to_string())]);
        assert_eq!(*status.lock().unwrap(), vec![true]);
    }

    #[test]
    fn channel_listener_forwards_in_order() {
        let (mut listener, mut rx) = ChannelListener::new();
        listener.on_connection_change(true);
        listener.on_message(ChangeEvent::insert("messages", json!({"id": 1})));

        assert_eq!(rx.try_recv().unwrap(), ListenerEvent::ConnectionChanged(true));
        assert!(matches!(rx.try_recv().unwrap(), ListenerEvent::Message(_)));
    }
}
