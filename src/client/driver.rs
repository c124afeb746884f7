//! Event loop owning all mutable client state.
//!
//! # Responsibilities
//! - Serve commands from the public handle
//! - Open and tear down the one live subscription
//! - Feed transport statuses to the state machine, arm the retry timer
//! - Deduplicate and deliver messages after the fixed delay
//!
//! # Design Decisions
//! - One task, one `select!`, biased towards commands so a `disconnect()`
//!   is always served before a retry timer that became due at the same time
//! - Subscription and retry timer are owned values; replacing or dropping
//!   them is the only way to tear them down

use std::future::pending;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};

use crate::client::listener::SubscriptionListener;
use crate::client::options::{generated_channel_name, ClientOptions, FilterTemplate};
use crate::client::state::{ConnectionMachine, ConnectionState, FailureAction};
use crate::client::subscription::{ActiveSubscription, TransportUpdate};
use crate::delivery::{DelayedQueue, MessageDeduplicator};
use crate::observability::metrics;
use crate::resilience::backoff::BackoffPolicy;
use crate::resilience::timer::RetryTimer;
use crate::transport::{ChangeEvent, ChannelStatus, Transport};

/// Requests sent from [`SubscriptionClient`](crate::client::SubscriptionClient).
#[derive(Debug)]
pub(crate) enum Command {
    Connect,
    Disconnect,
    ForceReconnect,
    ClearCache,
    SetSession(Option<String>),
    UpdatePolicy(BackoffPolicy),
    Shutdown,
}

enum Wake {
    Command(Command),
    Transport(TransportUpdate),
    RetryDue,
    DeliveryDue,
    Stop,
}

pub(crate) struct Driver {
    transport: Arc<dyn Transport>,
    listener: Box<dyn SubscriptionListener>,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    machine: ConnectionMachine,

    session_id: Option<String>,
    channel_name: Option<String>,
    fixed_channel_name: bool,
    name_prefix: String,
    filter: FilterTemplate,
    id_field: String,
    debug: bool,

    subscription: Option<ActiveSubscription>,
    retry_timer: Option<RetryTimer>,
    dedup: MessageDeduplicator,
    outbox: DelayedQueue<ChangeEvent>,
}

impl Driver {
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        options: ClientOptions,
        listener: Box<dyn SubscriptionListener>,
        commands: mpsc::UnboundedReceiver<Command>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        let fixed_channel_name = options.channel_name.is_some();
        let channel_name = options.channel_name.or_else(|| {
            options
                .session_id
                .as_deref()
                .map(|session| generated_channel_name(&options.name_prefix, session))
        });

        Self {
            transport,
            listener,
            commands,
            state_tx,
            machine: ConnectionMachine::new(options.policy),
            session_id: options.session_id,
            channel_name,
            fixed_channel_name,
            name_prefix: options.name_prefix,
            filter: options.filter,
            id_field: options.id_field,
            debug: options.debug,
            subscription: None,
            retry_timer: None,
            dedup: MessageDeduplicator::new(),
            outbox: DelayedQueue::new(options.delivery_delay),
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            match self.next_wake().await {
                Wake::Command(Command::Shutdown) | Wake::Stop => break,
                Wake::Command(command) => self.handle_command(command),
                Wake::Transport(update) => self.handle_transport(update),
                Wake::RetryDue => self.retry_now(),
                Wake::DeliveryDue => self.deliver_due(),
            }
        }

        self.retry_timer = None;
        self.subscription = None;
        if self.debug {
            tracing::debug!(
                pending_deliveries = self.outbox.len(),
                "Subscription client stopped"
            );
        }
    }

    async fn next_wake(&mut self) -> Wake {
        let commands = &mut self.commands;
        let subscription = self.subscription.as_mut();
        let retry_timer = self.retry_timer.as_mut();
        let next_delivery = self.outbox.next_due();

        tokio::select! {
            biased;
            command = commands.recv() => command.map_or(Wake::Stop, Wake::Command),
            update = next_update(subscription) => Wake::Transport(update),
            _ = retry_due(retry_timer) => Wake::RetryDue,
            () = delivery_due(next_delivery) => Wake::DeliveryDue,
        }
    }

    fn handle_command(&mut self, command: Command) {
        if self.debug {
            tracing::debug!(command = ?command, state = %self.machine.state(), "Client command");
        }
        match command {
            Command::Connect => self.connect(),
            Command::Disconnect => self.disconnect(),
            Command::ForceReconnect => {
                self.disconnect();
                self.connect();
            }
            Command::ClearCache => {
                self.dedup.clear();
                metrics::record_dedup_cache_size(0);
            }
            Command::SetSession(session_id) => self.set_session(session_id),
            Command::UpdatePolicy(policy) => {
                tracing::info!(
                    retry_limit = policy.retry_limit,
                    base_delay_ms = policy.base_delay.as_millis() as u64,
                    "Retry policy updated"
                );
                self.machine.set_policy(policy);
            }
            Command::Shutdown => {}
        }
    }

    /// External connect: a fresh retry cycle.
    fn connect(&mut self) {
        if self.session_id.is_none() {
            if self.debug {
                tracing::debug!("connect() ignored: no session id");
            }
            return;
        }
        self.retry_timer = None;
        self.machine.begin_cycle();
        self.open_subscription();
    }

    fn disconnect(&mut self) {
        self.retry_timer = None;
        self.subscription = None;
        if let Some(connected) = self.machine.on_disconnect() {
            self.notify_connection(connected);
        }
        self.publish_state();
    }

    fn set_session(&mut self, session_id: Option<String>) {
        if session_id == self.session_id {
            return;
        }
        let was_active = self.subscription.is_some() || self.retry_timer.is_some();

        if !self.fixed_channel_name {
            self.channel_name = session_id
                .as_deref()
                .map(|session| generated_channel_name(&self.name_prefix, session));
        }
        tracing::info!(session_id = ?session_id, "Session changed");
        self.session_id = session_id;

        if was_active {
            self.disconnect();
            self.connect();
        }
    }

    fn retry_now(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            if self.debug {
                tracing::debug!(attempt = timer.attempt(), "Retry timer fired");
            }
        }
        self.open_subscription();
    }

    /// Replace whatever subscription exists with a new one.
    fn open_subscription(&mut self) {
        let (Some(session_id), Some(channel_name)) =
            (self.session_id.clone(), self.channel_name.clone())
        else {
            return;
        };

        // Tear down first: at most one live channel per client.
        self.subscription = None;
        let notify = self.machine.on_connecting();
        self.publish_state();
        if let Some(connected) = notify {
            self.notify_connection(connected);
        }

        let filter = self.filter.for_session(&session_id);
        match ActiveSubscription::open(Arc::clone(&self.transport), &channel_name, &filter) {
            Ok(subscription) => {
                if self.debug {
                    tracing::debug!(
                        channel = %subscription.handle(),
                        filter = %filter.expression(),
                        attempt = self.machine.attempt(),
                        "Channel opened"
                    );
                }
                self.subscription = Some(subscription);
            }
            Err(e) => {
                tracing::warn!(channel = %channel_name, error = %e, "Failed to open subscription");
                self.handle_failure(ChannelStatus::Error(e.to_string()));
            }
        }
    }

    fn handle_transport(&mut self, update: TransportUpdate) {
        match update {
            TransportUpdate::Event(event) => self.admit(event),
            TransportUpdate::Status(ChannelStatus::Subscribed) => {
                let notify = self.machine.on_subscribed();
                self.publish_state();
                tracing::info!(channel = ?self.channel_name, "Subscribed");
                if let Some(connected) = notify {
                    self.notify_connection(connected);
                }
            }
            TransportUpdate::Status(status) => self.handle_failure(status),
            TransportUpdate::Ended => self.handle_failure(ChannelStatus::Closed),
        }
    }

    fn handle_failure(&mut self, status: ChannelStatus) {
        if self.retry_timer.is_some() {
            if self.debug {
                tracing::debug!(status = %status, "Failure ignored: retry already pending");
            }
            return;
        }

        self.subscription = None;
        let outcome = self.machine.on_failure();
        if let Some(connected) = outcome.notify {
            self.notify_connection(connected);
        }

        match outcome.action {
            FailureAction::Retry { attempt, delay } => {
                tracing::info!(
                    status = %status,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Channel lost, scheduling reconnect"
                );
                metrics::record_reconnect_attempt();
                self.retry_timer = Some(RetryTimer::schedule(attempt, delay));
            }
            FailureAction::GiveUp { attempts } => {
                tracing::warn!(
                    status = %status,
                    attempts,
                    "Reconnect attempts exhausted"
                );
                metrics::record_retry_exhausted();
            }
        }
        self.publish_state();
    }

    fn admit(&mut self, event: ChangeEvent) {
        match event.message_id(&self.id_field) {
            Some(id) => {
                if !self.dedup.admit(&id) {
                    if self.debug {
                        tracing::debug!(message_id = %id, "Duplicate message dropped");
                    }
                    metrics::record_duplicate();
                    return;
                }
                metrics::record_dedup_cache_size(self.dedup.len());
            }
            None => {
                if self.debug {
                    tracing::debug!(field = %self.id_field, "Message without id, delivering undeduplicated");
                }
            }
        }
        self.outbox.push(event);
    }

    fn deliver_due(&mut self) {
        for event in self.outbox.pop_due(Instant::now()) {
            metrics::record_delivered();
            self.listener.on_message(event);
        }
    }

    fn notify_connection(&mut self, connected: bool) {
        tracing::info!(connected, "Connection status changed");
        metrics::record_connected(connected);
        self.listener.on_connection_change(connected);
    }

    fn publish_state(&self) {
        let state = self.machine.state().clone();
        if self.debug {
            tracing::debug!(state = %state, "State transition");
        }
        self.state_tx.send_replace(state);
    }
}

async fn next_update(subscription: Option<&mut ActiveSubscription>) -> TransportUpdate {
    match subscription {
        Some(subscription) => subscription.next_update().await,
        None => pending().await,
    }
}

async fn retry_due(timer: Option<&mut RetryTimer>) -> u32 {
    match timer {
        Some(timer) => timer.await,
        None => pending().await,
    }
}

async fn delivery_due(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}
