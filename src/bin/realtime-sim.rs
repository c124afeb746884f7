use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use session_realtime::client::{ChannelListener, ClientOptions, ListenerEvent, SubscriptionClient};
use session_realtime::config::ObservabilityConfig;
use session_realtime::observability::logging;
use session_realtime::transport::memory::{InMemoryTransport, SubscribeOutcome};
use session_realtime::transport::{ChangeEvent, ChannelStatus};
use session_realtime::ConnectionState;

#[derive(Parser)]
#[command(name = "realtime-sim")]
#[command(about = "Drive a subscription client against an in-process broker", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "demo-session")]
    session: String,

    #[arg(long, default_value_t = 5)]
    retry_limit: u32,

    #[arg(long, default_value_t = 200)]
    retry_delay_ms: u64,

    #[arg(long, default_value_t = 100)]
    delivery_delay_ms: u64,

    /// Log every state transition.
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fail the first subscriptions, then recover
    Flap {
        #[arg(long, default_value_t = 3)]
        failures: usize,
    },
    /// Publish each message several times and show it arrives once
    Duplicates {
        #[arg(long, default_value_t = 5)]
        messages: usize,
        #[arg(long, default_value_t = 3)]
        copies: usize,
    },
    /// Fail until the retry budget runs out, then force a reconnect
    Exhaust,
}

struct Harness {
    broker: InMemoryTransport,
    client: SubscriptionClient,
    state: watch::Receiver<ConnectionState>,
    deliveries: mpsc::UnboundedReceiver<ListenerEvent>,
    table: String,
}

impl Harness {
    fn start(cli: &Cli) -> Self {
        let broker = InMemoryTransport::new();
        let options = ClientOptions::for_session(cli.session.clone())
            .with_retry_limit(cli.retry_limit)
            .with_retry_delay(Duration::from_millis(cli.retry_delay_ms))
            .with_delivery_delay(Duration::from_millis(cli.delivery_delay_ms))
            .with_debug(cli.debug);
        let table = options.filter.table.clone();

        let (listener, deliveries) = ChannelListener::new();
        let client = SubscriptionClient::spawn(Arc::new(broker.clone()), options, listener);
        let state = client.watch_state();

        Self {
            broker,
            client,
            state,
            deliveries,
            table,
        }
    }

    fn message(&self, session: &str, id: usize) -> ChangeEvent {
        ChangeEvent::insert(
            self.table.clone(),
            json!({ "id": format!("msg-{id}"), "session_id": session, "body": format!("hello #{id}") }),
        )
    }

    async fn wait_for(&mut self, what: &str, pred: impl FnMut(&ConnectionState) -> bool) -> bool {
        match timeout(Duration::from_secs(60), self.state.wait_for(pred)).await {
            Ok(Ok(state)) => {
                println!("state: {}", *state);
                true
            }
            Ok(Err(_)) => {
                eprintln!("client stopped while waiting for {what}");
                false
            }
            Err(_) => {
                eprintln!("timed out waiting for {what}");
                false
            }
        }
    }

    /// Print everything the listener received within `window`.
    async fn drain(&mut self, window: Duration) -> usize {
        let mut messages = 0;
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, self.deliveries.recv()).await {
            match event {
                ListenerEvent::Message(event) => {
                    messages += 1;
                    println!("message: {}", serde_json::to_string(&event.record).unwrap_or_default());
                }
                ListenerEvent::ConnectionChanged(connected) => println!("connected: {connected}"),
            }
        }
        messages
    }

    fn report(&self) {
        println!(
            "broker: opens={} closes={} live={}",
            self.broker.open_count(),
            self.broker.close_count(),
            self.broker.live_channels()
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_logging(&ObservabilityConfig {
        log_level: if cli.debug { "debug" } else { "info" }.to_string(),
        ..ObservabilityConfig::default()
    });

    let mut sim = Harness::start(&cli);
    let settle = Duration::from_millis(cli.delivery_delay_ms * 2 + 50);

    match cli.command {
        Commands::Flap { failures } => {
            sim.broker
                .script(std::iter::repeat(SubscribeOutcome::Fail(ChannelStatus::Closed)).take(failures));
            sim.client.connect();
            if sim.wait_for("connection", ConnectionState::is_connected).await {
                sim.broker.publish(sim.message(&cli.session, 1));
                sim.drain(settle).await;

                println!("dropping the channel from the broker side");
                sim.broker.emit_status(ChannelStatus::Error("server restart".into()));
                sim.wait_for("reconnection", ConnectionState::is_connected).await;
                sim.broker.publish(sim.message(&cli.session, 2));
                sim.drain(settle).await;
            }
        }
        Commands::Duplicates { messages, copies } => {
            sim.client.connect();
            if sim.wait_for("connection", ConnectionState::is_connected).await {
                for id in 0..messages {
                    for _ in 0..copies {
                        sim.broker.publish(sim.message(&cli.session, id));
                    }
                }
                let delivered = sim.drain(settle).await;
                println!("published {} copies, delivered {delivered}", messages * copies);

                sim.client.clear_message_cache();
                sim.broker.publish(sim.message(&cli.session, 0));
                let redelivered = sim.drain(settle).await;
                println!("after clearing the cache, msg-0 delivered {redelivered} more time(s)");
            }
        }
        Commands::Exhaust => {
            let attempts = cli.retry_limit as usize + 1;
            sim.broker
                .script(std::iter::repeat(SubscribeOutcome::Fail(ChannelStatus::TimedOut)).take(attempts));
            sim.client.connect();
            let exhausted = sim
                .wait_for("exhaustion", |s| matches!(s, ConnectionState::Exhausted { .. }))
                .await;
            sim.drain(settle).await;
            if exhausted {
                println!("forcing a reconnect");
                sim.client.force_reconnect();
                sim.wait_for("connection", ConnectionState::is_connected).await;
                sim.drain(settle).await;
            }
        }
    }

    sim.report();
    sim.client.disconnect();
    sim.client.shutdown().await;
    Ok(())
}
