//! Connection state machine.
//!
//! # States
//! - Disconnected: initial, and after an explicit disconnect
//! - Connecting: a channel is open, waiting for the subscribe acknowledgment
//! - Connected: the transport confirmed the subscription
//! - Reconnecting: a failure was observed, a retry timer is pending
//! - Exhausted: the retry budget is spent, nothing is scheduled
//!
//! # State Transitions
//! ```text
//! Disconnected → Connecting: connect()
//! Connecting   → Connected: subscribed (attempt reset to 0)
//! Connecting   → Reconnecting: closed / error / timed_out, attempt < limit
//! Connected    → Reconnecting: closed / error / timed_out
//! Reconnecting → Connecting: retry timer fired
//! Any failure  → Exhausted: attempt >= limit
//! Any          → Disconnected: disconnect()
//! ```
//!
//! # Design Decisions
//! - Pure: no I/O, returns the notifications the caller must deliver
//! - The listener hears `true`/`false` only on real changes of the boolean
//!   status, plus one `false` when a retry cycle is exhausted without having
//!   reported `false` already

use std::fmt;
use std::time::Duration;

use crate::resilience::backoff::{BackoffPolicy, RetryDecision, RetryState};

/// Externally visible connection state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting { attempt: u32 },
    Connected,
    Reconnecting { attempt: u32, delay: Duration },
    Exhausted { attempts: u32 },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting { attempt } => write!(f, "connecting (attempt {})", attempt),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Reconnecting { attempt, delay } => {
                write!(f, "reconnecting (attempt {} in {}ms)", attempt, delay.as_millis())
            }
            ConnectionState::Exhausted { attempts } => {
                write!(f, "gave up after {} attempts", attempts)
            }
        }
    }
}

/// What to do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    Retry { attempt: u32, delay: Duration },
    GiveUp { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    /// Status change to report to the listener, if any.
    pub notify: Option<bool>,
    pub action: FailureAction,
}

#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    connected: bool,
    retry: RetryState,
    policy: BackoffPolicy,
    /// A `false` was reported since the current cycle began.
    down_reported: bool,
}

impl ConnectionMachine {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            connected: false,
            retry: RetryState::default(),
            policy,
            down_reported: false,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn attempt(&self) -> u32 {
        self.retry.attempt()
    }

    /// Replace the policy. The failure count carries over.
    pub fn set_policy(&mut self, policy: BackoffPolicy) {
        self.policy = policy;
    }

    /// Start a new retry cycle (external connect or forced reconnect).
    pub fn begin_cycle(&mut self) {
        self.retry.reset();
        self.down_reported = false;
    }

    /// A new channel is being opened. Replacing a live channel drops the
    /// connection, which is reported like any other loss.
    pub fn on_connecting(&mut self) -> Option<bool> {
        self.state = ConnectionState::Connecting {
            attempt: self.retry.attempt(),
        };
        self.set_connected(false)
    }

    pub fn on_subscribed(&mut self) -> Option<bool> {
        self.retry.reset();
        self.down_reported = false;
        self.state = ConnectionState::Connected;
        self.set_connected(true)
    }

    pub fn on_failure(&mut self) -> FailureOutcome {
        let mut notify = self.set_connected(false);

        let action = match self.retry.next(&self.policy) {
            RetryDecision::Retry { attempt, delay } => {
                self.state = ConnectionState::Reconnecting { attempt, delay };
                FailureAction::Retry { attempt, delay }
            }
            RetryDecision::Exhausted { attempts } => {
                self.state = ConnectionState::Exhausted { attempts };
                if !self.down_reported {
                    self.down_reported = true;
                    notify = Some(false);
                }
                FailureAction::GiveUp { attempts }
            }
        };

        FailureOutcome { notify, action }
    }

    pub fn on_disconnect(&mut self) -> Option<bool> {
        self.state = ConnectionState::Disconnected;
        self.set_connected(false)
    }

    fn set_connected(&mut self, connected: bool) -> Option<bool> {
        if self.connected == connected {
            return None;
        }
        self.connected = connected;
        if !connected {
            self.down_reported = true;
        }
        Some(connected)
    }
}
