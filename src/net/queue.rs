//! Bounded FIFO of accepted connections.
//!
//! # Design Decisions
//! - Capacity is fixed at construction; a full queue hands the item back
//!   so the caller can answer it with a fixed 503 and close it
//! - Generic over the item so the ordering rules are testable without sockets

use std::collections::VecDeque;

/// Returned by [`ConnectionQueue::enqueue`] when at capacity.
#[derive(Debug, thiserror::Error)]
#[error("connection queue is full")]
pub struct QueueFull<C>(pub C);

#[derive(Debug)]
pub struct ConnectionQueue<C> {
    items: VecDeque<C>,
    capacity: usize,
}

impl<C> ConnectionQueue<C> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `item`, or give it back when `len() >= capacity()`.
    pub fn enqueue(&mut self, item: C) -> Result<(), QueueFull<C>> {
        if self.items.len() >= self.capacity {
            return Err(QueueFull(item));
        }
        self.items.push_back(item);
        Ok(())
    }

    /// Remove the oldest entry.
    pub fn dequeue(&mut self) -> Option<C> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Empty the queue, yielding entries oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = C> + '_ {
        self.items.drain(..)
    }
}
