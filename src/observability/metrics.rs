//! Metrics collection and exposition.
//!
//! # Metrics
//! - `realtime_messages_delivered_total` (counter): messages handed to the listener
//! - `realtime_messages_duplicate_total` (counter): messages dropped as repeats
//! - `realtime_reconnect_attempts_total` (counter): retry timers scheduled
//! - `realtime_retry_exhausted_total` (counter): retry budgets spent
//! - `realtime_connected` (gauge): 1=connected, 0=not connected
//! - `realtime_dedup_cache_size` (gauge): identifiers in the seen set
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Exporter is optional and bound to its own address

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

pub const MESSAGES_DELIVERED: &str = "realtime_messages_delivered_total";
pub const MESSAGES_DUPLICATE: &str = "realtime_messages_duplicate_total";
pub const RECONNECT_ATTEMPTS: &str = "realtime_reconnect_attempts_total";
pub const RETRY_EXHAUSTED: &str = "realtime_retry_exhausted_total";
pub const CONNECTED: &str = "realtime_connected";
pub const DEDUP_CACHE_SIZE: &str = "realtime_dedup_cache_size";

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_delivered() {
    counter!(MESSAGES_DELIVERED).increment(1);
}

pub fn record_duplicate() {
    counter!(MESSAGES_DUPLICATE).increment(1);
}

pub fn record_reconnect_attempt() {
    counter!(RECONNECT_ATTEMPTS).increment(1);
}

pub fn record_retry_exhausted() {
    counter!(RETRY_EXHAUSTED).increment(1);
}

pub fn record_connected(connected: bool) {
    gauge!(CONNECTED).set(if connected { 1.0 } else { 0.0 });
}

pub fn record_dedup_cache_size(size: usize) {
    gauge!(DEDUP_CACHE_SIZE).set(size as f64);
}
