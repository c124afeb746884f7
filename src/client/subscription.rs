//! The client's single live subscription.

use std::sync::Arc;

use crate::transport::{
    ChangeEvent, ChannelHandle, ChannelStatus, EventFilter, Transport, TransportResult,
};

/// Something the transport produced for the active subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportUpdate {
    Event(ChangeEvent),
    Status(ChannelStatus),
    /// The status stream ended without an explicit status.
    Ended,
}

/// An open, subscribed channel. Dropping it closes the channel.
pub struct ActiveSubscription {
    transport: Arc<dyn Transport>,
    handle: ChannelHandle,
    events: tokio::sync::mpsc::UnboundedReceiver<ChangeEvent>,
    status: tokio::sync::mpsc::UnboundedReceiver<ChannelStatus>,
}

impl ActiveSubscription {
    /// Open `name` and subscribe it to `filter`.
    ///
    /// If subscribing fails the freshly opened channel is closed again.
    pub fn open(
        transport: Arc<dyn Transport>,
        name: &str,
        filter: &EventFilter,
    ) -> TransportResult<Self> {
        let handle = transport.open_channel(name)?;
        match transport.subscribe(&handle, filter) {
            Ok(streams) => Ok(Self {
                transport,
                handle,
                events: streams.events,
                status: streams.status,
            }),
            Err(e) => {
                transport.close_channel(&handle);
                Err(e)
            }
        }
    }

    pub fn handle(&self) -> &ChannelHandle {
        &self.handle
    }

    /// Next event or status. Queued events are drained before a status so a
    /// message that precedes a close is not lost.
    pub async fn next_update(&mut self) -> TransportUpdate {
        tokio::select! {
            biased;
            Some(event) = self.events.recv() => TransportUpdate::Event(event),
            status = self.status.recv() => match status {
                Some(status) => TransportUpdate::Status(status),
                None => TransportUpdate::Ended,
            },
        }
    }
}

impl Drop for ActiveSubscription {
    fn drop(&mut self) {
        self.transport.close_channel(&self.handle);
        tracing::trace!(channel = %self.handle, "Subscription torn down");
    }
}
