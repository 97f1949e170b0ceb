use std::collections::{HashSet, VecDeque};

/// Bounded set of processed signatures with insertion-order (FIFO) eviction.
///
/// Approximates "recently seen": re-inserting an existing signature does
/// not refresh its position.
#[derive(Debug)]
pub struct SeenSignatures {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl SeenSignatures {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.members.contains(signature)
    }

    /// Insert; returns the evicted signature, if any. Inserting a present
    /// signature is a no-op.
    pub fn insert(&mut self, signature: &str) -> Option<String> {
        if self.members.contains(signature) {
            return None;
        }

        let evicted = if self.order.len() >= self.capacity {
            let oldest = self.order.pop_front();
            if let Some(ref sig) = oldest {
                self.members.remove(sig);
            }
            oldest
        } else {
            None
        };

        self.order.push_back(signature.to_string());
        self.members.insert(signature.to_string());
        evicted
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_contains() {
        let mut seen = SeenSignatures::new(3);
        assert!(seen.insert("a").is_none());
        assert!(seen.contains("a"));
        assert!(!seen.contains("b"));
    }

    #[test]
    fn test_duplicate_insert_is_noop() {
        let mut seen = SeenSignatures::new(2);
        seen.insert("a");
        seen.insert("a");
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_never_exceeds_capacity_and_evicts_oldest() {
        let mut seen = SeenSignatures::new(3);
        for sig in ["a", "b", "c"] {
            assert!(seen.insert(sig).is_none());
        }

        assert_eq!(seen.insert("d"), Some("a".to_string()));
        assert_eq!(seen.len(), 3);
        assert!(!seen.contains("a"));
        assert!(seen.contains("b") && seen.contains("c") && seen.contains("d"));

        for i in 0..100 {
            seen.insert(&format!("x{}", i));
            assert!(seen.len() <= seen.capacity());
        }
        assert!(seen.contains("x99"));
        assert!(!seen.contains("x96"));
    }

    #[test]
    fn test_reinsert_does_not_refresh_position() {
        let mut seen = SeenSignatures::new(2);
        seen.insert("a");
        seen.insert("b");
        seen.insert("a");
        assert_eq!(seen.insert("c"), Some("a".to_string()));
    }
}
