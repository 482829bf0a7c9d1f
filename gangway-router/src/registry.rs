//! Worker registry: id lookup plus the join-ordered list hash routing
//! indexes into.
//!
//! The list length is the modulus for every routing decision, recomputed at
//! decision time - it is never cached per connection, so a join or leave
//! immediately reshuffles which bucket a peer lands in.

use std::collections::HashMap;

use gangway_core::{Connection, WorkerId};

use crate::hash;
use crate::worker::Worker;

/// Outcome of removing a worker from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The id was unknown; nothing changed.
    NotRegistered,
    /// The worker was deleted from both structures.
    Removed {
        /// True when this removal left the registry empty.
        now_empty: bool,
    },
}

/// Registered workers, by id and in join order.
#[derive(Debug)]
pub struct WorkerRegistry<C> {
    /// Lookup by id.
    by_id: HashMap<WorkerId, Worker<C>>,
    /// Join-ordered ids; `order.len()` is the routing modulus.
    order: Vec<WorkerId>,
}

impl<C: Connection> WorkerRegistry<C> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Registers a worker, appending it to the join order.
    ///
    /// # Errors
    /// Returns the worker back if its id is already registered. Registering
    /// the same id twice is a caller bug; the registry refuses rather than
    /// silently replacing the delivery channel.
    pub fn add(&mut self, worker: Worker<C>) -> Result<(), Worker<C>> {
        if self.by_id.contains_key(&worker.id()) {
            return Err(worker);
        }
        self.order.push(worker.id());
        self.by_id.insert(worker.id(), worker);
        Ok(())
    }

    /// Removes a worker from both structures.
    pub fn remove(&mut self, id: WorkerId) -> RemoveOutcome {
        if self.by_id.remove(&id).is_none() {
            return RemoveOutcome::NotRegistered;
        }
        self.order.retain(|other| *other != id);
        RemoveOutcome::Removed {
            now_empty: self.order.is_empty(),
        }
    }

    /// Returns the worker registered under `id`.
    #[must_use]
    pub fn get(&self, id: WorkerId) -> Option<&Worker<C>> {
        self.by_id.get(&id)
    }

    /// Returns true if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: WorkerId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Picks the worker for a peer address against the current list.
    ///
    /// Returns `None` only when the registry is empty; a non-empty list
    /// always has a worker at `hash mod len`.
    #[must_use]
    pub fn route(&self, peer_addr: &str) -> Option<WorkerId> {
        let idx = hash::bucket(peer_addr, self.order.len())?;
        Some(self.order[idx])
    }

    /// Returns the number of registered workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true when no workers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<C: Connection> Default for WorkerRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
