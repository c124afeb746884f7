//! Fixed-delay delivery queue.
//!
//! Every item waits the same delay, so deadlines are non-decreasing and a
//! FIFO is enough to keep transport order.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct DelayedQueue<T> {
    delay: Duration,
    items: VecDeque<(Instant, T)>,
}

impl<T> DelayedQueue<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            items: VecDeque::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Queue `item` for release `delay` from now.
    pub fn push(&mut self, item: T) {
        self.items.push_back((Instant::now() + self.delay, item));
    }

    /// Deadline of the oldest queued item.
    pub fn next_due(&self) -> Option<Instant> {
        self.items.front().map(|(due, _)| *due)
    }

    /// Remove and return every item due at or before `now`, oldest first.
    pub fn pop_due(&mut self, now: Instant) -> Vec<T> {
        let mut due = Vec::new();
        while self.items.front().is_some_and(|(at, _)| *at <= now) {
            if let Some((_, item)) = self.items.pop_front() {
                due.push(item);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn releases_in_order_after_delay() {
        let mut queue = DelayedQueue::new(Duration::from_millis(100));
        queue.push("a");
        tokio::time::advance(Duration::from_millis(40)).await;
        queue.push("b");

        assert!(queue.pop_due(Instant::now()).is_empty());

        tokio::time::advance(Duration::from_millis(60)).await;
        assert_eq!(queue.pop_due(Instant::now()), vec!["a"]);

        tokio::time::advance(Duration::from_millis(40)).await;
        assert_eq!(queue.pop_due(Instant::now()), vec!["b"]);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_delay_is_due_immediately() {
        let mut queue = DelayedQueue::new(Duration::ZERO);
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.next_due(), Some(Instant::now()));
        assert_eq!(queue.pop_due(Instant::now()), vec![1, 2]);
    }
}
