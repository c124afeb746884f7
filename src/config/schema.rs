//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the realtime
//! client. All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::backoff::BackoffPolicy;
use crate::transport::ChangeKind;

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Reconnect and delivery behavior.
    pub subscription: SubscriptionConfig,

    /// Which rows a session channel listens to.
    pub channel: ChannelConfig,

    /// Realtime endpoint settings.
    pub transport: TransportConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Reconnect and delivery configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Consecutive failed attempts before giving up.
    pub retry_limit: u32,

    /// Delay before the first retry, in milliseconds.
    pub retry_delay_ms: u64,

    /// Upper bound on any retry delay, in milliseconds.
    pub max_retry_delay_ms: u64,

    /// Growth factor between consecutive retries.
    pub backoff_multiplier: f64,

    /// Random extra delay as a fraction of the computed delay (0.0 disables).
    pub jitter: f64,

    /// Pause between admitting a message and handing it to the listener.
    pub delivery_delay_ms: u64,

    /// Log internal state transitions.
    pub debug: bool,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            retry_limit: 15,
            retry_delay_ms: 2_000,
            max_retry_delay_ms: 20_000,
            backoff_multiplier: 1.5,
            jitter: 0.0,
            delivery_delay_ms: 100,
            debug: false,
        }
    }
}

impl SubscriptionConfig {
    /// Backoff policy described by this section.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(self.retry_delay_ms),
            multiplier: self.backoff_multiplier,
            max_delay: Duration::from_millis(self.max_retry_delay_ms),
            retry_limit: self.retry_limit,
            jitter: self.jitter,
        }
    }

    pub fn delivery_delay(&self) -> Duration {
        Duration::from_millis(self.delivery_delay_ms)
    }
}

/// Row selection for session channels.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Database schema holding the table.
    pub schema: String,

    /// Table whose row changes are streamed.
    pub table: String,

    /// Column compared against the session identifier.
    pub session_column: String,

    /// Change kinds to receive.
    pub event: ChangeKind,

    /// Row field holding the message identifier used for dedup.
    pub id_field: String,

    /// Prefix of generated channel names.
    pub name_prefix: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            table: "messages".to_string(),
            session_column: "session_id".to_string(),
            event: ChangeKind::All,
            id_field: "id".to_string(),
            name_prefix: "chat".to_string(),
        }
    }
}

/// Realtime endpoint configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Project URL (http/https) or socket URL (ws/wss).
    pub url: String,

    /// Public API key appended to the socket URL.
    pub api_key: Option<String>,

    /// User access token sent with each join.
    pub access_token: Option<String>,

    /// Heartbeat interval in seconds.
    pub heartbeat_secs: u64,

    /// Socket connect and join acknowledgment timeout in seconds.
    pub join_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".to_string(),
            api_key: None,
            access_token: None,
            heartbeat_secs: 30,
            join_timeout_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9464".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RelayConfig::default();
        assert_eq!(config.subscription.retry_limit, 15);
        assert_eq!(config.subscription.retry_delay_ms, 2_000);
        assert_eq!(config.subscription.max_retry_delay_ms, 20_000);
        assert_eq!(config.subscription.delivery_delay_ms, 100);
        assert_eq!(config.channel.table, "messages");
        assert_eq!(config.channel.event, ChangeKind::All);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            [subscription]
            retry_limit = 3

            [channel]
            table = "chat_messages"
            event = "INSERT"
            "#,
        )
        .unwrap();
        assert_eq!(config.subscription.retry_limit, 3);
        assert_eq!(config.subscription.retry_delay_ms, 2_000);
        assert_eq!(config.channel.table, "chat_messages");
        assert_eq!(config.channel.event, ChangeKind::Insert);
        assert_eq!(config.channel.session_column, "session_id");
    }

    #[test]
    fn backoff_policy_reflects_section() {
        let section = SubscriptionConfig {
            retry_limit: 3,
            retry_delay_ms: 1_000,
            ..Default::default()
        };
        let policy = section.backoff_policy();
        assert_eq!(policy.retry_limit, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(1_000));
        assert_eq!(policy.max_delay, Duration::from_millis(20_000));
    }
}
