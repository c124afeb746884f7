//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (retry limit, delays, multiplier, jitter)
//! - Check the realtime URL can be turned into a socket endpoint
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::RelayConfig;
use crate::transport::websocket::realtime_endpoint;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let sub = &config.subscription;
    if sub.retry_limit == 0 {
        errors.push(ValidationError::new("subscription.retry_limit", "must be at least 1"));
    }
    if sub.retry_delay_ms == 0 {
        errors.push(ValidationError::new("subscription.retry_delay_ms", "must be positive"));
    }
    if sub.max_retry_delay_ms < sub.retry_delay_ms {
        errors.push(ValidationError::new(
            "subscription.max_retry_delay_ms",
            format!("must be >= retry_delay_ms ({})", sub.retry_delay_ms),
        ));
    }
    if !(sub.backoff_multiplier.is_finite() && sub.backoff_multiplier >= 1.0) {
        errors.push(ValidationError::new("subscription.backoff_multiplier", "must be >= 1.0"));
    }
    if !(0.0..=1.0).contains(&sub.jitter) {
        errors.push(ValidationError::new("subscription.jitter", "must be within [0.0, 1.0]"));
    }

    let channel = &config.channel;
    for (field, value) in [
        ("channel.schema", &channel.schema),
        ("channel.table", &channel.table),
        ("channel.session_column", &channel.session_column),
        ("channel.id_field", &channel.id_field),
        ("channel.name_prefix", &channel.name_prefix),
    ] {
        if value.trim().is_empty() {
            errors.push(ValidationError::new(field, "must not be empty"));
        }
    }
    if channel.name_prefix.chars().any(char::is_whitespace) {
        errors.push(ValidationError::new("channel.name_prefix", "must not contain whitespace"));
    }

    let transport = &config.transport;
    if let Err(e) = realtime_endpoint(&transport.url, transport.api_key.as_deref()) {
        errors.push(ValidationError::new("transport.url", e.to_string()));
    }
    if transport.heartbeat_secs == 0 {
        errors.push(ValidationError::new("transport.heartbeat_secs", "must be positive"));
    }
    if transport.join_timeout_secs == 0 {
        errors.push(ValidationError::new("transport.join_timeout_secs", "must be positive"));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", config.observability.log_level),
        ));
    }
    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&RelayConfig::default()).is_ok());
    }

    #[test]
    fn all_errors_are_reported() {
        let mut config = RelayConfig::default();
        config.subscription.retry_limit = 0;
        config.subscription.backoff_multiplier = 0.5;
        config.channel.table = " ".into();
        config.transport.url = "ftp://nowhere".into();
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "subscription.retry_limit",
                "subscription.backoff_multiplier",
                "channel.table",
                "transport.url",
                "observability.log_level",
            ]
        );
    }

    #[test]
    fn max_delay_below_base_is_rejected() {
        let mut config = RelayConfig::default();
        config.subscription.retry_delay_ms = 5_000;
        config.subscription.max_retry_delay_ms = 1_000;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "subscription.max_retry_delay_ms");
        assert!(errors[0].to_string().contains("5000"));
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = RelayConfig::default();
        config.observability.metrics_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());
        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }
}
