//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Client driver produces:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (channel, attempt, delay_ms) over formatted strings
//! - Per-transition logs gated by the client's debug flag

pub mod logging;
pub mod metrics;
