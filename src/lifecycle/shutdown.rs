//! Shutdown coordination for the realtime binaries.

use std::sync::Arc;

use tokio::sync::watch;

/// Why the process is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT or SIGTERM.
    Signal,
    /// Asked for by the program itself.
    Requested,
}

/// Coordinator for graceful shutdown.
///
/// Backed by a watch channel: a task that starts waiting after the trigger
/// still observes it. The first reason wins.
#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Trigger the shutdown. Later triggers keep the first reason.
    pub fn trigger(&self, reason: ShutdownReason) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    /// The reason, once triggered.
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.tx.borrow()
    }

    /// Resolve once the shutdown has been triggered.
    pub async fn wait(&self) -> ShutdownReason {
        let mut rx = self.tx.subscribe();
        let reason = match rx.wait_for(Option::is_some).await {
            Ok(reason) => *reason,
            // The sender lives in `self`.
            Err(_) => None,
        };
        reason.unwrap_or(ShutdownReason::Requested)
    }

    /// Tasks currently waiting.
    pub fn waiter_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_wakes_waiters() {
        let shutdown = Shutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait().await })
        };
        tokio::task::yield_now().await;

        shutdown.trigger(ShutdownReason::Signal);
        assert_eq!(waiter.await.unwrap(), ShutdownReason::Signal);
    }

    #[tokio::test]
    async fn late_waiter_sees_earlier_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger(ShutdownReason::Requested);
        assert_eq!(shutdown.wait().await, ShutdownReason::Requested);
        assert_eq!(shutdown.waiter_count(), 0);
    }

    #[test]
    fn first_reason_wins() {
        let shutdown = Shutdown::new();
        assert_eq!(shutdown.reason(), None);
        shutdown.trigger(ShutdownReason::Signal);
        shutdown.trigger(ShutdownReason::Requested);
        assert_eq!(shutdown.reason(), Some(ShutdownReason::Signal));
    }
}
