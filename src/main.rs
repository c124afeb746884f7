//! session-tail: follow the realtime message stream of one chat session.
//!
//! # Architecture Overview
//!
//! ```text
//!   config.toml ──▶ loader/validation ──▶ RelayConfig ──▶ ClientOptions
//!        │                                                   │
//!        └──▶ ConfigWatcher ── new BackoffPolicy ──┐         ▼
//!                                                  │  ┌──────────────────┐    ┌───────────────────┐
//!                                                  └─▶│SubscriptionClient│───▶│WebSocketTransport │◀──▶ realtime
//!                                                     │  driver task     │◀───│ (one socket/chan) │     service
//!                                                     └────────┬─────────┘    └───────────────────┘
//!                                                              │ ChannelListener
//!                                                              ▼
//!                                                    stdout (one JSON line per message)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use notify::RecommendedWatcher;
use tokio::sync::mpsc;

use session_realtime::client::{ChannelListener, ClientOptions, ListenerEvent, SubscriptionClient};
use session_realtime::config::loader::{load_config, ConfigError};
use session_realtime::config::validation::validate_config;
use session_realtime::config::watcher::ConfigWatcher;
use session_realtime::config::RelayConfig;
use session_realtime::lifecycle::{signals, Shutdown};
use session_realtime::observability::{logging, metrics};
use session_realtime::transport::websocket::{WebSocketSettings, WebSocketTransport};
use session_realtime::{BackoffPolicy, ConnectionState};

#[derive(Parser)]
#[command(name = "session-tail")]
#[command(about = "Tail the realtime message stream of one chat session", long_about = None)]
struct Cli {
    /// Session identifier whose rows are streamed.
    #[arg(short, long)]
    session: String,

    /// TOML configuration file (hot-reloads the retry policy).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Realtime project or socket URL, overrides the config file.
    #[arg(short, long)]
    url: Option<String>,

    /// Public API key, overrides the config file.
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Fixed channel name instead of a generated one.
    #[arg(long)]
    channel: Option<String>,

    /// Log internal state transitions.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    logging::init_logging(&config.observability);
    tracing::info!(
        session_id = %cli.session,
        table = %config.channel.table,
        retry_limit = config.subscription.retry_limit,
        retry_delay_ms = config.subscription.retry_delay_ms,
        "session-tail starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let transport = WebSocketTransport::new(WebSocketSettings::from_config(&config.transport)?);
    tracing::info!(endpoint = %transport.endpoint().host_str().unwrap_or_default(), "Realtime endpoint");

    let mut options = ClientOptions::from_config(&config, Some(cli.session.clone()));
    if let Some(channel) = &cli.channel {
        options = options.with_channel_name(channel.clone());
    }

    let (listener, mut deliveries) = ChannelListener::new();
    let client = SubscriptionClient::spawn(Arc::new(transport), options, listener);
    client.connect();

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(&shutdown);

    let (_watcher, mut policy_updates) = start_watcher(cli.config.as_deref(), &config);

    loop {
        tokio::select! {
            Some(delivery) = deliveries.recv() => match delivery {
                ListenerEvent::Message(event) => println!("{}", serde_json::to_string(&event)?),
                ListenerEvent::ConnectionChanged(true) => tracing::info!("Live"),
                ListenerEvent::ConnectionChanged(false) => {
                    if let ConnectionState::Exhausted { attempts } = client.state() {
                        tracing::error!(attempts, "Gave up reconnecting; restart to try again");
                    } else {
                        tracing::warn!("Connection lost");
                    }
                }
            },
            Some(policy) = policy_updates.recv() => client.update_policy(policy),
            reason = shutdown.wait() => {
                tracing::info!(reason = ?reason, "Shutting down");
                break;
            }
        }
    }

    client.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<RelayConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RelayConfig::default(),
    };

    if let Some(url) = &cli.url {
        config.transport.url = url.clone();
    }
    if let Some(key) = &cli.api_key {
        config.transport.api_key = Some(key.clone());
    }
    if cli.debug {
        config.subscription.debug = true;
        config.observability.log_level = "debug".to_string();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn start_watcher(
    path: Option<&Path>,
    config: &RelayConfig,
) -> (Option<RecommendedWatcher>, mpsc::UnboundedReceiver<BackoffPolicy>) {
    let Some(path) = path else {
        let (_, rx) = mpsc::unbounded_channel();
        return (None, rx);
    };

    let (watcher, rx) = ConfigWatcher::new(path, config.clone());
    match watcher.run() {
        Ok(watcher) => (Some(watcher), rx),
        Err(e) => {
            tracing::warn!(error = %e, "Config hot reload unavailable");
            (None, rx)
        }
    }
}
