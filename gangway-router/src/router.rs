//! The connection router - the state machine tying the listener to the pool.
//!
//! The router runs as a single task. Control commands (worker add/remove),
//! endpoint events (bind resolution, accepted connections), and handoff
//! acknowledgements all arrive over channels and are processed one at a
//! time to completion, so no locks are needed and no two operations ever
//! interleave.
//!
//! # Lifecycle
//!
//! Binding -> Ready -> Closed (terminal, no reopening).
//!
//! - Workers added while Binding are deferred until the endpoint resolves.
//! - The last worker leaving closes the endpoint and sheds anything still
//!   queued; there is nobody left to serve it.
//! - Dropping every [`RouterHandle`] tears the router down the same way.
//!
//! # Handoff
//!
//! Each accepted connection is queued, then offered to the worker at
//! `hash(peer) mod pool_size`. The offer is asynchronous: a waiter task
//! forwards the worker's acknowledgement back into the router, and each
//! acknowledgement triggers at most one further pop-and-send, so draining a
//! burst is iterative rather than recursive.

use std::net::SocketAddr;
use std::sync::Arc;

use gangway_core::{BindCode, Connection, ConnectionId, Limits, RoutingKey, WorkerId};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, info, warn};

use crate::queue::{Pending, PendingQueue};
use crate::registry::{RemoveOutcome, WorkerRegistry};
use crate::worker::{Dispatch, DispatchReply, Worker};

/// Errors surfaced through [`RouterHandle::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AddError {
    /// The worker id is already registered (or pending registration).
    #[error("worker id already registered")]
    DuplicateWorker,
    /// The endpoint failed to acquire its OS resource; the router never
    /// reached Ready and cannot be reused.
    #[error("endpoint failed to bind: {0}")]
    Bind(BindCode),
    /// The router has already closed.
    #[error("router is closed")]
    Closed,
}

/// Events a listening endpoint feeds into the router.
///
/// The production endpoint lives in the runtime crate; tests drive this
/// channel directly.
#[derive(Debug)]
pub enum EndpointEvent<C> {
    /// Binding succeeded. Carries the bound local address, or `None` for
    /// path-based listeners which have no address/port pair.
    Bound(Option<SocketAddr>),
    /// Binding failed with a translated platform error.
    BindFailed(BindCode),
    /// A raw accept produced a connection.
    Accepted(C),
    /// A raw accept failed; nothing was produced.
    AcceptFailed(std::io::Error),
}

/// Router lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouterState {
    /// Waiting for the endpoint's bind to resolve.
    Binding,
    /// Bound and routing.
    Ready,
    /// Terminal; the endpoint is closed.
    Closed,
}

/// Control commands sent through a [`RouterHandle`].
enum Command<C> {
    Add {
        worker: Worker<C>,
        reply: oneshot::Sender<Result<Option<SocketAddr>, AddError>>,
    },
    Remove {
        id: WorkerId,
        reply: oneshot::Sender<bool>,
    },
}

/// A handoff acknowledgement routed back into the router task.
struct AckEvent<C> {
    worker: WorkerId,
    conn_id: ConnectionId,
    outcome: AckOutcome<C>,
}

/// What became of an in-flight connection.
enum AckOutcome<C> {
    /// The worker took ownership.
    Accepted,
    /// The worker declined; the connection comes back for re-routing.
    Rejected(C),
    /// The reply channel was dropped; the connection went down with the
    /// worker's transport and cannot be retried.
    Lost,
}

/// Handle to interact with a running router.
///
/// Cheap to clone. When the last handle is dropped the router tears down as
/// if its final worker had been removed.
#[derive(Debug)]
pub struct RouterHandle<C> {
    commands: mpsc::Sender<Command<C>>,
}

// Hand-written so clones don't require `C: Clone`.
impl<C> Clone for RouterHandle<C> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
        }
    }
}

impl<C: Connection> RouterHandle<C> {
    /// Registers a worker and resolves once with the bound address info.
    ///
    /// While the endpoint is still binding the call is deferred until the
    /// bind resolves.
    ///
    /// # Errors
    /// - [`AddError::DuplicateWorker`] if the id is already registered.
    /// - [`AddError::Bind`] if the endpoint failed to bind.
    /// - [`AddError::Closed`] if the router has already torn down.
    pub async fn add(&self, worker: Worker<C>) -> Result<Option<SocketAddr>, AddError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Add { worker, reply: tx })
            .await
            .map_err(|_| AddError::Closed)?;
        rx.await.map_err(|_| AddError::Closed)?
    }

    /// Unregisters a worker.
    ///
    /// Returns true when this removal (or an earlier teardown) left the
    /// router closed; false while other workers keep it alive. Removing an
    /// unknown id is a no-op returning false.
    pub async fn remove(&self, id: WorkerId) -> bool {
        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Remove { id, reply: tx })
            .await
            .is_err()
        {
            // Router already gone: teardown has happened.
            return true;
        }
        rx.await.unwrap_or(true)
    }
}

/// The router task state.
struct Router<C> {
    key: RoutingKey,
    state: RouterState,
    registry: WorkerRegistry<C>,
    queue: PendingQueue<C>,
    /// Adds received while Binding, replayed when the endpoint resolves.
    pending_adds: Vec<(Worker<C>, oneshot::Sender<Result<Option<SocketAddr>, AddError>>)>,
    /// Bound local address; `None` until Ready and for path listeners.
    local_addr: Option<SocketAddr>,
    next_conn_id: ConnectionId,
    acks_tx: mpsc::Sender<AckEvent<C>>,
    /// Tells the endpoint task to close its listener.
    endpoint_shutdown: Arc<Notify>,
}

/// Spawns a router for one shared listening endpoint.
///
/// `endpoint_events` is the channel the endpoint task reports into (bind
/// resolution first, then accepts); `endpoint_shutdown` is how the router
/// closes the endpoint at teardown. Returns a cloneable handle; the task
/// exits once the router closes or every handle is dropped.
///
/// # Panics
/// Panics if `limits` fails validation; zero-sized queues cannot route.
pub fn spawn<C: Connection>(
    key: RoutingKey,
    limits: Limits,
    endpoint_events: mpsc::Receiver<EndpointEvent<C>>,
    endpoint_shutdown: Arc<Notify>,
) -> RouterHandle<C> {
    if let Err(reason) = limits.validate() {
        panic!("invalid limits: {reason}");
    }

    let (commands_tx, commands_rx) = mpsc::channel(limits.command_queue_depth as usize);
    let (acks_tx, acks_rx) = mpsc::channel(limits.endpoint_queue_depth as usize);

    let router = Router {
        key,
        state: RouterState::Binding,
        registry: WorkerRegistry::new(),
        queue: PendingQueue::new(limits.max_pending_connections as usize),
        pending_adds: Vec::new(),
        local_addr: None,
        next_conn_id: ConnectionId::new(0),
        acks_tx,
        endpoint_shutdown,
    };

    tokio::spawn(router.run(commands_rx, endpoint_events, acks_rx));

    RouterHandle {
        commands: commands_tx,
    }
}

impl<C: Connection> Router<C> {
    /// Main router loop; processes one command, endpoint event, or
    /// acknowledgement at a time.
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command<C>>,
        mut endpoint: mpsc::Receiver<EndpointEvent<C>>,
        mut acks: mpsc::Receiver<AckEvent<C>>,
    ) {
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Add { worker, reply }) => self.handle_add(worker, reply),
                    Some(Command::Remove { id, reply }) => self.handle_remove(id, reply),
                    None => {
                        // Every handle dropped: same teardown as losing the
                        // last worker.
                        self.teardown("all router handles dropped");
                    }
                },
                Some(event) = endpoint.recv() => self.handle_endpoint_event(event),
                Some(ack) = acks.recv() => self.handle_ack(ack),
            }

            if self.state == RouterState::Closed {
                break;
            }
        }
    }

    fn handle_add(
        &mut self,
        worker: Worker<C>,
        reply: oneshot::Sender<Result<Option<SocketAddr>, AddError>>,
    ) {
        let id = worker.id();

        // The duplicate check covers registered workers and adds still
        // waiting on bind resolution.
        if self.registry.contains(id) || self.pending_adds.iter().any(|(w, _)| w.id() == id) {
            let _ = reply.send(Err(AddError::DuplicateWorker));
            return;
        }

        match self.state {
            RouterState::Binding => {
                debug!(worker_id = id.get(), "add deferred until bind resolves");
                self.pending_adds.push((worker, reply));
            }
            RouterState::Ready => self.register(worker, reply),
            RouterState::Closed => {
                let _ = reply.send(Err(AddError::Closed));
            }
        }
    }

    /// Registers a worker on the Ready path and starts draining to it.
    fn register(
        &mut self,
        worker: Worker<C>,
        reply: oneshot::Sender<Result<Option<SocketAddr>, AddError>>,
    ) {
        let id = worker.id();
        if self.registry.add(worker).is_err() {
            let _ = reply.send(Err(AddError::DuplicateWorker));
            return;
        }

        info!(
            key = %self.key,
            worker_id = id.get(),
            pool_size = self.registry.len(),
            "worker joined"
        );
        let _ = reply.send(Ok(self.local_addr));

        // Offer queued work to the newcomer; its acknowledgements keep the
        // drain going.
        self.handoff(id);
    }

    fn handle_remove(&mut self, id: WorkerId, reply: oneshot::Sender<bool>) {
        match self.registry.remove(id) {
            RemoveOutcome::NotRegistered => {
                let _ = reply.send(false);
            }
            RemoveOutcome::Removed { now_empty: false } => {
                info!(
                    key = %self.key,
                    worker_id = id.get(),
                    pool_size = self.registry.len(),
                    "worker left"
                );
                let _ = reply.send(false);
                self.redistribute_queued();
            }
            RemoveOutcome::Removed { now_empty: true } => {
                info!(key = %self.key, worker_id = id.get(), "last worker left");
                self.teardown("last worker removed");
                let _ = reply.send(true);
            }
        }
    }

    fn handle_endpoint_event(&mut self, event: EndpointEvent<C>) {
        match event {
            EndpointEvent::Bound(addr) => self.on_bound(addr),
            EndpointEvent::BindFailed(code) => self.on_bind_failed(code),
            EndpointEvent::Accepted(conn) => {
                if self.state == RouterState::Ready {
                    self.distribute(conn);
                } else {
                    // Accept racing a teardown; dropping closes it.
                    debug!(key = %self.key, "connection discarded, router not ready");
                }
            }
            EndpointEvent::AcceptFailed(err) => {
                // Nothing was produced; do not enqueue.
                warn!(key = %self.key, error = %err, "accept failed");
            }
        }
    }

    fn on_bound(&mut self, addr: Option<SocketAddr>) {
        if self.state != RouterState::Binding {
            return;
        }
        self.state = RouterState::Ready;
        self.local_addr = addr;
        info!(key = %self.key, addr = ?addr, "endpoint bound");

        for (worker, reply) in std::mem::take(&mut self.pending_adds) {
            self.register(worker, reply);
        }
    }

    fn on_bind_failed(&mut self, code: BindCode) {
        if self.state != RouterState::Binding {
            return;
        }
        warn!(key = %self.key, code = %code, "endpoint bind failed");

        // Every deferred add learns of the failure; none are registered.
        for (_, reply) in self.pending_adds.drain(..) {
            let _ = reply.send(Err(AddError::Bind(code)));
        }
        self.state = RouterState::Closed;
    }

    /// Routes a freshly accepted connection.
    fn distribute(&mut self, conn: C) {
        let id = self.next_conn_id;
        self.next_conn_id = id.next();
        self.route_pending(Pending { id, conn });
    }

    /// Queues a connection and wakes the worker its peer hashes to.
    ///
    /// Routing always runs against the current worker list, so a
    /// connection coming back here after a rejection may land on a
    /// different worker than first chosen.
    fn route_pending(&mut self, pending: Pending<C>) {
        let conn_id = pending.id;
        let peer = pending.conn.peer_address();

        if self.queue.push_back(pending).is_err() {
            warn!(
                key = %self.key,
                conn_id = conn_id.get(),
                "pending queue full, shedding connection"
            );
            return;
        }

        match self.registry.route(&peer) {
            Some(target) => {
                debug!(
                    key = %self.key,
                    conn_id = conn_id.get(),
                    peer = %peer,
                    worker_id = target.get(),
                    "connection routed"
                );
                self.handoff(target);
            }
            None => {
                // No modulus target; the connection waits for a worker to
                // join.
                debug!(
                    key = %self.key,
                    conn_id = conn_id.get(),
                    peer = %peer,
                    "no worker registered, connection queued"
                );
            }
        }
    }

    /// Re-routes every queued connection against the current worker list.
    ///
    /// Called after a worker leaves while the pool stays non-empty: entries
    /// that had parked behind the departed worker are recomputed and offered
    /// to a survivor so none strand. Acceptance order is preserved.
    fn redistribute_queued(&mut self) {
        for pending in self.queue.take_all() {
            self.route_pending(pending);
        }
    }

    /// Offers the oldest queued connection to one worker.
    ///
    /// Sends at most one dispatch; the acknowledgement coming back triggers
    /// the next one. An unregistered worker is a no-op - whatever is queued
    /// stays queued for a later trigger.
    fn handoff(&mut self, worker_id: WorkerId) {
        let Some(worker) = self.registry.get(worker_id).cloned() else {
            return;
        };
        let Some(pending) = self.queue.pop_front() else {
            return;
        };

        let conn_id = pending.id;
        let (reply_tx, reply_rx) = oneshot::channel();
        let dispatch = Dispatch {
            key: self.key.clone(),
            conn: pending.conn,
            reply: reply_tx,
        };

        match worker.try_deliver(dispatch) {
            Ok(()) => {
                debug!(
                    key = %self.key,
                    conn_id = conn_id.get(),
                    worker_id = worker_id.get(),
                    "connection in flight"
                );

                // The waiter owns only the reply end; the acknowledgement
                // re-enters the router as an event.
                let acks = self.acks_tx.clone();
                tokio::spawn(async move {
                    let outcome = match reply_rx.await {
                        Ok(DispatchReply::Accepted) => AckOutcome::Accepted,
                        Ok(DispatchReply::Rejected(conn)) => AckOutcome::Rejected(conn),
                        Err(_) => AckOutcome::Lost,
                    };
                    let _ = acks
                        .send(AckEvent {
                            worker: worker_id,
                            conn_id,
                            outcome,
                        })
                        .await;
                });
            }
            Err(TrySendError::Full(dispatch)) => {
                // The worker's channel is saturated; its outstanding
                // acknowledgements will resume the drain.
                debug!(
                    worker_id = worker_id.get(),
                    conn_id = conn_id.get(),
                    "worker delivery queue full, holding connection"
                );
                self.queue.push_front(Pending {
                    id: conn_id,
                    conn: dispatch.conn,
                });
            }
            Err(TrySendError::Closed(dispatch)) => {
                // The worker vanished at the transport level but has not
                // been removed yet; the connection waits for a membership
                // change.
                warn!(
                    worker_id = worker_id.get(),
                    conn_id = conn_id.get(),
                    "worker delivery channel closed, holding connection"
                );
                self.queue.push_front(Pending {
                    id: conn_id,
                    conn: dispatch.conn,
                });
            }
        }
    }

    fn handle_ack(&mut self, ack: AckEvent<C>) {
        let registered = self.registry.contains(ack.worker);

        match ack.outcome {
            AckOutcome::Accepted => {
                // Ownership moved with the dispatch; nothing to close here.
                debug!(
                    conn_id = ack.conn_id.get(),
                    worker_id = ack.worker.get(),
                    "connection accepted by worker"
                );
            }
            AckOutcome::Rejected(conn) => {
                // Exactly one re-submission, re-evaluated against the
                // current worker list. A late rejection from an already
                // removed worker still returns the handle, so it is
                // re-routed rather than leaked.
                debug!(
                    conn_id = ack.conn_id.get(),
                    worker_id = ack.worker.get(),
                    "connection rejected by worker, re-routing"
                );
                self.route_pending(Pending {
                    id: ack.conn_id,
                    conn,
                });
            }
            AckOutcome::Lost => {
                warn!(
                    conn_id = ack.conn_id.get(),
                    worker_id = ack.worker.get(),
                    "connection lost in transfer, worker reply channel dropped"
                );
            }
        }

        // Keep draining this worker's share of the queue. A late reply
        // from an unregistered worker is not actionable.
        if registered {
            self.handoff(ack.worker);
        }
    }

    /// Closes the endpoint and sheds whatever is still queued.
    fn teardown(&mut self, reason: &'static str) {
        if self.state == RouterState::Closed {
            return;
        }

        let shed = self.queue.take_all();
        if !shed.is_empty() {
            warn!(
                key = %self.key,
                count = shed.len(),
                "closing queued connections, no worker left to serve them"
            );
        }
        drop(shed);

        for (_, reply) in self.pending_adds.drain(..) {
            let _ = reply.send(Err(AddError::Closed));
        }

        self.endpoint_shutdown.notify_one();
        self.state = RouterState::Closed;
        info!(key = %self.key, reason, "router closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FakeConn(&'static str);

    impl Connection for FakeConn {
        fn peer_address(&self) -> String {
            self.0.to_string()
        }
    }

    fn spawn_router() -> (
        RouterHandle<FakeConn>,
        mpsc::Sender<EndpointEvent<FakeConn>>,
        Arc<Notify>,
    ) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let shutdown = Arc::new(Notify::new());
        let handle = spawn(
            RoutingKey::new("test"),
            Limits::new(),
            events_rx,
            Arc::clone(&shutdown),
        );
        (handle, events_tx, shutdown)
    }

    #[tokio::test]
    async fn test_add_resolves_with_bound_address() {
        let (handle, events, _shutdown) = spawn_router();
        let addr: SocketAddr = "127.0.0.1:4010".parse().unwrap();
        events.send(EndpointEvent::Bound(Some(addr))).await.unwrap();

        let (worker, _rx) = Worker::channel(WorkerId::new(1), 8);
        let info = handle.add(worker).await.unwrap();
        assert_eq!(info, Some(addr));
    }

    #[tokio::test]
    async fn test_add_deferred_until_bound() {
        let (handle, events, _shutdown) = spawn_router();
        let addr: SocketAddr = "127.0.0.1:4011".parse().unwrap();

        let (worker, _rx) = Worker::channel(WorkerId::new(1), 8);
        let add = tokio::spawn(async move { handle.add(worker).await });

        // The add cannot resolve before the endpoint does.
        tokio::task::yield_now().await;
        assert!(!add.is_finished());

        events.send(EndpointEvent::Bound(Some(addr))).await.unwrap();
        assert_eq!(add.await.unwrap().unwrap(), Some(addr));
    }

    #[tokio::test]
    async fn test_duplicate_worker_id_rejected() {
        let (handle, events, _shutdown) = spawn_router();
        events.send(EndpointEvent::Bound(None)).await.unwrap();

        let (first, _rx1) = Worker::channel(WorkerId::new(5), 8);
        let (second, _rx2) = Worker::channel(WorkerId::new(5), 8);

        handle.add(first).await.unwrap();
        assert_eq!(handle.add(second).await, Err(AddError::DuplicateWorker));
    }

    #[tokio::test]
    async fn test_bind_failure_reported_to_pending_adds() {
        let (handle, events, _shutdown) = spawn_router();

        let (worker, _rx) = Worker::channel(WorkerId::new(1), 8);
        let add = tokio::spawn(async move { handle.add(worker).await });

        // Let the add reach the router before the bind resolves.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        events
            .send(EndpointEvent::BindFailed(BindCode::AddrInUse))
            .await
            .unwrap();

        assert_eq!(add.await.unwrap(), Err(AddError::Bind(BindCode::AddrInUse)));
    }

    #[tokio::test]
    async fn test_remove_unknown_worker_is_noop() {
        let (handle, events, _shutdown) = spawn_router();
        events.send(EndpointEvent::Bound(None)).await.unwrap();

        let (worker, _rx) = Worker::channel(WorkerId::new(1), 8);
        handle.add(worker).await.unwrap();

        assert!(!handle.remove(WorkerId::new(99)).await);
        // The known worker is unaffected and still tears the router down.
        assert!(handle.remove(WorkerId::new(1)).await);
    }

    #[tokio::test]
    async fn test_last_remove_closes_router() {
        let (handle, events, _shutdown) = spawn_router();
        events.send(EndpointEvent::Bound(None)).await.unwrap();

        let (worker, _rx) = Worker::channel(WorkerId::new(1), 8);
        handle.add(worker).await.unwrap();

        assert!(handle.remove(WorkerId::new(1)).await);

        // Closed is terminal: adds now fail.
        let (again, _rx2) = Worker::channel(WorkerId::new(2), 8);
        assert_eq!(handle.add(again).await, Err(AddError::Closed));
    }

    #[tokio::test]
    async fn test_teardown_signals_endpoint_shutdown() {
        let (handle, events, shutdown) = spawn_router();
        events.send(EndpointEvent::Bound(None)).await.unwrap();

        let (worker, _rx) = Worker::channel(WorkerId::new(1), 8);
        handle.add(worker).await.unwrap();

        let notified = tokio::spawn({
            let shutdown = Arc::clone(&shutdown);
            async move { shutdown.notified().await }
        });

        handle.remove(WorkerId::new(1)).await;
        tokio::time::timeout(std::time::Duration::from_secs(1), notified)
            .await
            .expect("endpoint shutdown should be signaled")
            .unwrap();
    }
}
