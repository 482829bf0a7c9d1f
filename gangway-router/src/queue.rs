//! FIFO of accepted-but-unassigned connections.

use std::collections::VecDeque;

use gangway_core::ConnectionId;

/// A queued connection awaiting assignment.
#[derive(Debug)]
pub struct Pending<C> {
    /// Log-correlation id assigned at accept time.
    pub id: ConnectionId,
    /// The connection itself; the queue is its sole owner while it sits here.
    pub conn: C,
}

/// Accepted connections not yet offered to a worker, oldest first.
#[derive(Debug)]
pub struct PendingQueue<C> {
    entries: VecDeque<Pending<C>>,
    capacity: usize,
}

impl<C> PendingQueue<C> {
    /// Creates a queue bounded at `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Appends a newly accepted connection.
    ///
    /// # Errors
    /// Returns the entry back when the queue is at capacity; the caller
    /// decides whether to shed it.
    pub fn push_back(&mut self, pending: Pending<C>) -> Result<(), Pending<C>> {
        if self.entries.len() >= self.capacity {
            return Err(pending);
        }
        self.entries.push_back(pending);
        Ok(())
    }

    /// Returns an entry to the head of the queue.
    ///
    /// Used when a delivery could not happen (full or closed worker
    /// channel) so the entry keeps its place in acceptance order. Requeues
    /// are admitted even at capacity - the entry already held a slot.
    pub fn push_front(&mut self, pending: Pending<C>) {
        self.entries.push_front(pending);
    }

    /// Pops the oldest entry.
    pub fn pop_front(&mut self) -> Option<Pending<C>> {
        self.entries.pop_front()
    }

    /// Drains every entry, oldest first.
    pub fn take_all(&mut self) -> Vec<Pending<C>> {
        self.entries.drain(..).collect()
    }

    /// Returns the number of queued connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
