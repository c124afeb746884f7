//! WebSocket adapter for the hosted realtime service.
//!
//! # Responsibilities
//! - One socket task per subscribed channel
//! - Join with a `column=eq.value` change filter and report the outcome
//! - Forward row changes, keep the socket alive with heartbeats
//! - Leave cleanly when the channel is closed
//!
//! # Design Decisions
//! - Every socket-level failure ends the task after a single status; the
//!   client owns reconnection, the adapter never retries on its own
//! - Missing join reply within `join_timeout` is reported as `TimedOut`

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::oneshot;
use tokio::time::{self, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;
use uuid::Uuid;

use crate::config::TransportConfig;
use crate::transport::protocol::{self, Frame, Inbound};
use crate::transport::{
    subscription_pair, validate_channel_name, ChannelHandle, ChannelStatus, EventFilter,
    SubscriptionSink, SubscriptionStreams, Transport, TransportError, TransportResult,
};

/// Protocol version requested from the server.
const PROTOCOL_VSN: &str = "1.0.0";

/// Connection settings for [`WebSocketTransport`].
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Fully built socket URL, including query parameters.
    pub endpoint: Url,
    /// User token sent with the join, when row-level security needs one.
    pub access_token: Option<String>,
    pub heartbeat: Duration,
    pub join_timeout: Duration,
}

impl WebSocketSettings {
    pub fn from_config(config: &TransportConfig) -> TransportResult<Self> {
        Ok(Self {
            endpoint: realtime_endpoint(&config.url, config.api_key.as_deref())?,
            access_token: config.access_token.clone(),
            heartbeat: Duration::from_secs(config.heartbeat_secs),
            join_timeout: Duration::from_secs(config.join_timeout_secs),
        })
    }
}

/// Build the socket URL from a project URL such as `https://abc.example.co`.
///
/// `http`/`https` become `ws`/`wss`; the realtime path is appended unless the
/// URL already points at a `/websocket` endpoint.
pub fn realtime_endpoint(base: &str, api_key: Option<&str>) -> TransportResult<Url> {
    let mut url = Url::parse(base)?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(TransportError::Rejected(format!(
                "unsupported URL scheme '{}'",
                other
            )))
        }
    };
    if url.set_scheme(scheme).is_err() {
        return Err(TransportError::Rejected(format!(
            "cannot use scheme '{}' for {}",
            scheme, base
        )));
    }

    if !url.path().ends_with("/websocket") {
        let path = format!("{}/realtime/v1/websocket", url.path().trim_end_matches('/'));
        url.set_path(&path);
    }

    {
        let mut query = url.query_pairs_mut();
        if let Some(key) = api_key {
            query.append_pair("apikey", key);
        }
        query.append_pair("vsn", PROTOCOL_VSN);
    }

    Ok(url)
}

/// Realtime transport speaking Phoenix channel framing over WebSocket.
pub struct WebSocketTransport {
    settings: Arc<WebSocketSettings>,
    /// Leave signals for channels with a running socket task.
    channels: DashMap<Uuid, Option<oneshot::Sender<()>>>,
}

impl WebSocketTransport {
    pub fn new(settings: WebSocketSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            channels: DashMap::new(),
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.settings.endpoint
    }
}

impl Transport for WebSocketTransport {
    fn open_channel(&self, name: &str) -> TransportResult<ChannelHandle> {
        validate_channel_name(name)?;
        let handle = ChannelHandle::new(name);
        self.channels.insert(handle.id(), None);
        Ok(handle)
    }

    fn subscribe(
        &self,
        handle: &ChannelHandle,
        filter: &EventFilter,
    ) -> TransportResult<SubscriptionStreams> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let mut slot = self
            .channels
            .get_mut(&handle.id())
            .ok_or_else(|| TransportError::UnknownChannel(handle.to_string()))?;

        let (sink, streams) = subscription_pair();
        let (leave_tx, leave_rx) = oneshot::channel();
        // A resubscribe on the same handle replaces the previous socket.
        if let Some(previous) = slot.replace(leave_tx) {
            let _ = previous.send(());
        }

        let task = ChannelTask {
            settings: Arc::clone(&self.settings),
            topic: protocol::topic_for(handle.name()),
            filter: filter.clone(),
            sink,
            channel: handle.to_string(),
        };
        runtime.spawn(task.run(leave_rx));
        Ok(streams)
    }

    fn close_channel(&self, handle: &ChannelHandle) {
        if let Some((_, Some(leave))) = self.channels.remove(&handle.id()) {
            let _ = leave.send(());
        }
    }
}

struct ChannelTask {
    settings: Arc<WebSocketSettings>,
    topic: String,
    filter: EventFilter,
    sink: SubscriptionSink,
    channel: String,
}

impl ChannelTask {
    async fn run(self, mut leave: oneshot::Receiver<()>) {
        let connect = time::timeout(
            self.settings.join_timeout,
            connect_async(self.settings.endpoint.as_str()),
        );
        let stream = tokio::select! {
            _ = &mut leave => return,
            result = connect => match result {
                Ok(Ok((stream, _))) => stream,
                Ok(Err(e)) => {
                    tracing::warn!(channel = %self.channel, error = %e, "Realtime socket connect failed");
                    self.report(ChannelStatus::Error(e.to_string()));
                    return;
                }
                Err(_) => {
                    tracing::warn!(channel = %self.channel, "Realtime socket connect timed out");
                    self.report(ChannelStatus::TimedOut);
                    return;
                }
            }
        };

        let (mut write, mut read) = stream.split();
        let mut next_ref: u64 = 1;
        let join_ref = next_ref.to_string();
        let join = Frame::join(
            &self.topic,
            &self.filter,
            self.settings.access_token.as_deref(),
            next_ref,
        );
        if let Err(e) = write.send(encode(&join)).await {
            self.report(ChannelStatus::Error(e.to_string()));
            return;
        }

        let join_deadline = time::sleep(self.settings.join_timeout);
        tokio::pin!(join_deadline);
        let mut joined = false;
        let mut heartbeat = time::interval_at(
            Instant::now() + self.settings.heartbeat,
            self.settings.heartbeat,
        );

        loop {
            tokio::select! {
                _ = &mut leave => {
                    next_ref += 1;
                    let _ = write.send(encode(&Frame::leave(&self.topic, next_ref))).await;
                    let _ = write.close().await;
                    tracing::debug!(channel = %self.channel, "Left realtime channel");
                    return;
                }
                _ = &mut join_deadline, if !joined => {
                    tracing::warn!(channel = %self.channel, "No join reply before deadline");
                    self.report(ChannelStatus::TimedOut);
                    return;
                }
                _ = heartbeat.tick() => {
                    next_ref += 1;
                    if let Err(e) = write.send(encode(&Frame::heartbeat(next_ref))).await {
                        self.report(ChannelStatus::Error(e.to_string()));
                        return;
                    }
                }
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        let frame = match serde_json::from_str::<Frame>(text.as_str()) {
                            Ok(frame) => frame,
                            Err(e) => {
                                tracing::trace!(channel = %self.channel, error = %e, "Skipping undecodable frame");
                                continue;
                            }
                        };
                        match protocol::classify(&frame, &self.topic, &join_ref) {
                            Inbound::Status(status) => {
                                let failed = status.is_failure();
                                joined |= status == ChannelStatus::Subscribed;
                                self.report(status);
                                if failed {
                                    return;
                                }
                            }
                            Inbound::Change(event) => {
                                if self.sink.events.send(event).is_err() {
                                    // Subscriber went away without closing the channel.
                                    return;
                                }
                            }
                            Inbound::Ignore => {}
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        self.report(ChannelStatus::Closed);
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.report(ChannelStatus::Error(e.to_string()));
                        return;
                    }
                },
            }
        }
    }

    fn report(&self, status: ChannelStatus) {
        tracing::debug!(channel = %self.channel, status = %status, "Realtime channel status");
        let _ = self.sink.status.send(status);
    }
}

fn encode(frame: &Frame) -> Message {
    // Frame holds only strings and JSON values; serialization cannot fail.
    let text = serde_json::to_string(frame).unwrap_or_default();
    Message::Text(text.into())
}
