//! Wire format of the realtime service (Phoenix channel framing).
//!
//! # Frames
//! ```text
//! → {"topic":"realtime:<channel>","event":"phx_join","payload":{config..},"ref":"1"}
//! ← {"topic":"realtime:<channel>","event":"phx_reply","payload":{"status":"ok"},"ref":"1"}
//! ← {"topic":"realtime:<channel>","event":"postgres_changes","payload":{"data":{..}}}
//! → {"topic":"phoenix","event":"heartbeat","payload":{},"ref":"n"}
//! → {"topic":"realtime:<channel>","event":"phx_leave","payload":{},"ref":"n"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::transport::{ChangeEvent, ChannelStatus, EventFilter};

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_CHANGES: &str = "postgres_changes";
pub const EVENT_SYSTEM: &str = "system";
pub const HEARTBEAT_TOPIC: &str = "phoenix";

/// One frame on the socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl Frame {
    pub fn join(topic: &str, filter: &EventFilter, access_token: Option<&str>, reference: u64) -> Self {
        let mut payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": filter.event.as_str(),
                    "schema": filter.schema,
                    "table": filter.table,
                    "filter": filter.expression(),
                }],
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = Value::String(token.to_string());
        }
        Self {
            topic: topic.to_string(),
            event: EVENT_JOIN.to_string(),
            payload,
            reference: Some(reference.to_string()),
        }
    }

    pub fn leave(topic: &str, reference: u64) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_LEAVE.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    pub fn heartbeat(reference: u64) -> Self {
        Self {
            topic: HEARTBEAT_TOPIC.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }
}

/// Topic name for a channel.
pub fn topic_for(channel: &str) -> String {
    format!("realtime:{}", channel)
}

/// What an inbound frame means for the subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Status(ChannelStatus),
    Change(ChangeEvent),
    Ignore,
}

/// Interpret a frame received on `topic` while waiting on join `join_ref`.
pub fn classify(frame: &Frame, topic: &str, join_ref: &str) -> Inbound {
    if frame.topic != topic {
        return Inbound::Ignore;
    }

    match frame.event.as_str() {
        EVENT_REPLY if frame.reference.as_deref() == Some(join_ref) => {
            match frame.payload.get("status").and_then(Value::as_str) {
                Some("ok") => Inbound::Status(ChannelStatus::Subscribed),
                _ => Inbound::Status(ChannelStatus::Error(reply_reason(&frame.payload))),
            }
        }
        EVENT_CHANGES => frame
            .payload
            .get("data")
            .cloned()
            .and_then(|data| serde_json::from_value::<ChangeEvent>(data).ok())
            .map_or(Inbound::Ignore, Inbound::Change),
        EVENT_SYSTEM => match frame.payload.get("status").and_then(Value::as_str) {
            Some("error") => Inbound::Status(ChannelStatus::Error(reply_reason(&frame.payload))),
            _ => Inbound::Ignore,
        },
        EVENT_ERROR => Inbound::Status(ChannelStatus::Error("channel error".to_string())),
        EVENT_CLOSE => Inbound::Status(ChannelStatus::Closed),
        _ => Inbound::Ignore,
    }
}

fn reply_reason(payload: &Value) -> String {
    payload
        .pointer("/response/reason")
        .or_else(|| payload.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("subscription refused")
        .to_string()
}
