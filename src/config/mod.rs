//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RelayConfig (validated, immutable)
//!     → SubscriptionConfig → BackoffPolicy / ClientOptions
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → new BackoffPolicy pushed to the running client
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Only the retry policy is hot-reloadable; channel and transport changes
//!   need a restart

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::ChannelConfig;
pub use schema::ObservabilityConfig;
pub use schema::RelayConfig;
pub use schema::SubscriptionConfig;
pub use schema::TransportConfig;
