//! Cancellable reconnect timer.
//!
//! # Design Decisions
//! - The timer is a plain owned value; dropping it cancels the retry
//! - It is polled by the owner's event loop, never spawned, so a cancelled
//!   timer cannot fire behind the owner's back

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::time::{sleep_until, Instant, Sleep};

/// A scheduled reconnect attempt.
#[derive(Debug)]
pub struct RetryTimer {
    sleep: Pin<Box<Sleep>>,
    attempt: u32,
    delay: Duration,
    deadline: Instant,
}

impl RetryTimer {
    /// Schedule attempt `attempt` to fire after `delay`.
    pub fn schedule(attempt: u32, delay: Duration) -> Self {
        let deadline = Instant::now() + delay;
        Self {
            sleep: Box::pin(sleep_until(deadline)),
            attempt,
            delay,
            deadline,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

impl Future for RetryTimer {
    type Output = u32;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<u32> {
        let attempt = self.attempt;
        self.sleep.as_mut().poll(cx).map(|()| attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let start = Instant::now();
        let timer = RetryTimer::schedule(2, Duration::from_millis(1_500));
        assert_eq!(timer.deadline(), start + Duration::from_millis(1_500));
        let attempt = timer.await;
        assert_eq!(attempt, 2);
        assert_eq!(start.elapsed(), Duration::from_millis(1_500));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_timer_never_fires() {
        let mut slot = Some(RetryTimer::schedule(1, Duration::from_millis(100)));
        drop(slot.take());
        let fired = tokio::time::timeout(Duration::from_secs(1), async {
            match slot.as_mut() {
                Some(timer) => Some(timer.await),
                None => std::future::pending().await,
            }
        })
        .await;
        assert!(fired.is_err());
    }
}
