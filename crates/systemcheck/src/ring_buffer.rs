//! Fixed-capacity circular log.

use crate::error::{RegistryError, Result};

/// Circular buffer that keeps the most recent `capacity` items.
///
/// Pushing into a full buffer overwrites the oldest slot; the buffer never
/// grows past its capacity.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    capacity: usize,
    /// Slot the next push writes to.
    next: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer. Fails when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(RegistryError::config("ring buffer capacity must be at least 1"));
        }
        Ok(Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            next: 0,
        })
    }

    /// Append an item, discarding the oldest one when full.
    pub fn push(&mut self, item: T) {
        if self.slots.len() < self.capacity {
            self.slots.push(item);
        } else {
            self.slots[self.next] = item;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    /// Retained items, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        // Until the buffer wraps, `next == slots.len()` and the split is a no-op.
        let split = if self.is_full() { self.next } else { 0 };
        let (newer, older) = self.slots.split_at(split);
        older.iter().chain(newer.iter())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True once `capacity` items have been pushed.
    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Snapshot of the retained window in insertion order.
    pub fn contents(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_rejected() {
        let err = RingBuffer::<u32>::new(0).unwrap_err();
        assert!(matches!(err, RegistryError::Config(_)));
    }

    #[test]
    fn test_partial_fill_keeps_order() {
        let mut buf = RingBuffer::new(4).unwrap();
        buf.push(1);
        buf.push(2);

        assert_eq!(buf.len(), 2);
        assert!(!buf.is_full());
        assert_eq!(buf.contents(), vec![1, 2]);
    }

    #[test]
    fn test_overflow_keeps_last_capacity_items() {
        let mut buf = RingBuffer::new(3).unwrap();
        for i in 1..=7 {
            buf.push(i);
        }

        assert_eq!(buf.len(), 3);
        assert!(buf.is_full());
        assert_eq!(buf.contents(), vec![5, 6, 7]);
    }

    #[test]
    fn test_exact_fill_then_one_more() {
        let mut buf = RingBuffer::new(2).unwrap();
        buf.push("a");
        buf.push("b");
        assert_eq!(buf.contents(), vec!["a", "b"]);

        buf.push("c");
        assert_eq!(buf.contents(), vec!["b", "c"]);
    }

    #[test]
    fn test_capacity_one() {
        let mut buf = RingBuffer::new(1).unwrap();
        assert!(buf.is_empty());
        buf.push(10);
        buf.push(20);
        assert_eq!(buf.contents(), vec![20]);
        assert_eq!(buf.capacity(), 1);
    }
}
