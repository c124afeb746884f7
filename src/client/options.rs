//! Client construction options.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::RelayConfig;
use crate::resilience::backoff::BackoffPolicy;
use crate::transport::{ChangeKind, EventFilter};

/// Row selection applied to every session; the session id fills in the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTemplate {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub event: ChangeKind,
}

impl Default for FilterTemplate {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            table: "messages".to_string(),
            column: "session_id".to_string(),
            event: ChangeKind::All,
        }
    }
}

impl FilterTemplate {
    pub fn for_session(&self, session_id: &str) -> EventFilter {
        EventFilter {
            schema: self.schema.clone(),
            table: self.table.clone(),
            column: self.column.clone(),
            value: session_id.to_string(),
            event: self.event,
        }
    }
}

/// Everything a [`SubscriptionClient`](crate::client::SubscriptionClient) needs
/// besides the transport and the listener.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Session the channel is scoped to. `None` makes `connect()` a no-op.
    pub session_id: Option<String>,
    /// Fixed channel name; generated from the session when `None`.
    pub channel_name: Option<String>,
    /// Prefix of generated channel names.
    pub name_prefix: String,
    pub policy: BackoffPolicy,
    /// Pause between admitting a message and delivering it. Zero is allowed.
    pub delivery_delay: Duration,
    pub filter: FilterTemplate,
    /// Row field holding the message identifier.
    pub id_field: String,
    /// Log internal state transitions.
    pub debug: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            session_id: None,
            channel_name: None,
            name_prefix: "chat".to_string(),
            policy: BackoffPolicy::default(),
            delivery_delay: Duration::from_millis(100),
            filter: FilterTemplate::default(),
            id_field: "id".to_string(),
            debug: false,
        }
    }
}

impl ClientOptions {
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    /// Options described by a loaded configuration.
    pub fn from_config(config: &RelayConfig, session_id: Option<String>) -> Self {
        let channel = &config.channel;
        Self {
            session_id,
            channel_name: None,
            name_prefix: channel.name_prefix.clone(),
            policy: config.subscription.backoff_policy(),
            delivery_delay: config.subscription.delivery_delay(),
            filter: FilterTemplate {
                schema: channel.schema.clone(),
                table: channel.table.clone(),
                column: channel.session_column.clone(),
                event: channel.event,
            },
            id_field: channel.id_field.clone(),
            debug: config.subscription.debug,
        }
    }

    pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
        self.channel_name = Some(name.into());
        self
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.policy.retry_limit = retry_limit;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.policy.base_delay = delay;
        self
    }

    pub fn with_delivery_delay(mut self, delay: Duration) -> Self {
        self.delivery_delay = delay;
        self
    }

    pub fn with_filter(mut self, filter: FilterTemplate) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// `{prefix}-{session}-{unix millis}`, unique per construction.
pub fn generated_channel_name(prefix: &str, session_id: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{}-{}-{}", prefix, session_id, millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = ClientOptions::default();
        assert!(options.session_id.is_none());
        assert_eq!(options.policy.retry_limit, 15);
        assert_eq!(options.policy.base_delay, Duration::from_millis(2_000));
        assert_eq!(options.delivery_delay, Duration::from_millis(100));
    }

    #[test]
    fn builder_overrides() {
        let options = ClientOptions::for_session("s-9")
            .with_retry_limit(3)
            .with_retry_delay(Duration::from_millis(1_000))
            .with_delivery_delay(Duration::ZERO)
            .with_channel_name("fixed");
        assert_eq!(options.session_id.as_deref(), Some("s-9"));
        assert_eq!(options.policy.retry_limit, 3);
        assert_eq!(options.policy.delay_for(2), Duration::from_millis(1_500));
        assert_eq!(options.channel_name.as_deref(), Some("fixed"));
    }

    #[test]
    fn generated_name_embeds_session() {
        let name = generated_channel_name("chat", "s-9");
        assert!(name.starts_with("chat-s-9-"));
        assert!(name["chat-s-9-".len()..].parse::<u128>().is_ok());
    }

    #[test]
    fn filter_template_fills_session() {
        let filter = FilterTemplate::default().for_session("s-9");
        assert_eq!(filter.expression(), "session_id=eq.s-9");
        assert_eq!(filter.table, "messages");
    }

    #[test]
    fn from_config_maps_sections() {
        let mut config = RelayConfig::default();
        config.channel.table = "chat_messages".into();
        config.channel.id_field = "message_id".into();
        config.subscription.retry_limit = 4;
        config.subscription.debug = true;

        let options = ClientOptions::from_config(&config, Some("s".into()));
        assert_eq!(options.filter.table, "chat_messages");
        assert_eq!(options.id_field, "message_id");
        assert_eq!(options.policy.retry_limit, 4);
        assert!(options.debug);
    }
}
