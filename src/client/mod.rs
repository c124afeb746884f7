//! Resilient subscription client.
//!
//! # Data Flow
//! ```text
//! SubscriptionClient (handle, cheap to call from anywhere)
//!     → Command over mpsc
//!     → driver.rs (single task owning all state)
//!         → subscription.rs (one live channel, closed on drop)
//!         → state.rs (Disconnected / Connecting / Connected / Reconnecting / Exhausted)
//!         → resilience (backoff + retry timer)
//!         → delivery (dedup + delayed queue)
//!     → SubscriptionListener callbacks
//!     → watch::Receiver<ConnectionState>
//! ```
//!
//! # Design Decisions
//! - Fire and forget: no method returns an error, failures surface through
//!   the listener and the state watch
//! - The transport is injected; nothing here reaches for a global client

mod driver;
pub mod listener;
pub mod options;
pub mod state;
pub mod subscription;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::resilience::backoff::BackoffPolicy;
use crate::transport::Transport;
use driver::{Command, Driver};

pub use listener::{listener_fn, ChannelListener, ListenerEvent, SubscriptionListener};
pub use options::{ClientOptions, FilterTemplate};
pub use state::ConnectionState;

/// Handle to a running subscription driver.
///
/// Dropping the handle stops the driver and closes the channel.
pub struct SubscriptionClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl SubscriptionClient {
    /// Spawn the driver on the current tokio runtime. Does not connect.
    pub fn spawn<L>(transport: Arc<dyn Transport>, options: ClientOptions, listener: L) -> Self
    where
        L: SubscriptionListener,
    {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let driver = Driver::new(transport, options, Box::new(listener), commands_rx, state_tx);

        Self {
            commands: commands_tx,
            state: state_rx,
            task: tokio::spawn(driver.run()),
        }
    }

    /// Open the channel for the configured session. No-op without a session.
    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    /// Cancel any pending retry and close the channel. Idempotent.
    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    /// Tear down and connect again with a fresh retry budget.
    pub fn force_reconnect(&self) {
        self.send(Command::ForceReconnect);
    }

    /// Forget every message identifier seen so far.
    pub fn clear_message_cache(&self) {
        self.send(Command::ClearCache);
    }

    /// Switch to another session, reconnecting if a channel is live.
    pub fn set_session(&self, session_id: Option<String>) {
        self.send(Command::SetSession(session_id));
    }

    /// Replace the retry policy used for subsequent failures.
    pub fn update_policy(&self, policy: BackoffPolicy) {
        self.send(Command::UpdatePolicy(policy));
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Subscribe to state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop the driver and wait for it to release the channel.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Subscription driver ended abnormally");
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Subscription driver already stopped");
        }
    }
}
