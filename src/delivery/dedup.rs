//! Duplicate suppression by message identifier.

use std::collections::HashSet;

/// Set of message identifiers already handed to the consumer.
///
/// Grows for the lifetime of the client; only [`clear`](Self::clear) shrinks it.
#[derive(Debug, Default)]
pub struct MessageDeduplicator {
    seen: HashSet<String>,
}

impl MessageDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `id` is offered, `false` for repeats.
    pub fn admit(&mut self, id: &str) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.seen.insert(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Start a fresh dedup window.
    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_are_rejected() {
        let mut dedup = MessageDeduplicator::new();
        assert!(dedup.admit("abc"));
        assert!(!dedup.admit("abc"));
        assert!(dedup.admit("abd"));
        assert_eq!(dedup.len(), 2);
    }

    #[test]
    fn clear_opens_a_new_window() {
        let mut dedup = MessageDeduplicator::new();
        dedup.admit("abc");
        dedup.clear();
        assert!(dedup.is_empty());
        assert!(!dedup.contains("abc"));
        assert!(dedup.admit("abc"));
    }
}
