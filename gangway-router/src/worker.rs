//! Worker identity and the connection handoff protocol.
//!
//! A worker, from the router's point of view, is an id plus an asynchronous
//! delivery channel capable of carrying a connection handle. The router
//! holds nothing else - worker lifecycle (spawning, supervision, exit)
//! belongs to the hosting process.
//!
//! # Handoff Protocol
//!
//! Router -> Worker: a [`Dispatch`] carrying the routing key, the connection
//! (ownership moves with the message), and a reply channel.
//!
//! Worker -> Router: a [`DispatchReply`]. `Accepted` means the worker took
//! ownership; `Rejected` hands the connection back because the worker is
//! draining before exit and declines additional work.

use gangway_core::{Connection, RoutingKey, WorkerId};
use tokio::sync::{mpsc, oneshot};

/// A new-connection message offered to one worker.
#[derive(Debug)]
pub struct Dispatch<C> {
    /// Key correlating the shared listener this connection arrived on.
    pub key: RoutingKey,
    /// The connection, owned by the worker for the duration of the offer.
    pub conn: C,
    /// Reply channel; exactly one [`DispatchReply`] is expected.
    pub reply: oneshot::Sender<DispatchReply<C>>,
}

/// A worker's answer to a [`Dispatch`].
#[derive(Debug)]
pub enum DispatchReply<C> {
    /// The worker took ownership of the connection.
    Accepted,
    /// The worker declined (it is draining); the connection comes back to
    /// the router for re-routing.
    Rejected(C),
}

/// Handle to one registered worker: its id and delivery channel.
///
/// Cloning is cheap; clones address the same underlying channel.
#[derive(Debug)]
pub struct Worker<C> {
    id: WorkerId,
    delivery: mpsc::Sender<Dispatch<C>>,
}

// Hand-written so clones don't require `C: Clone`; only the channel handle
// is duplicated, never a connection.
impl<C> Clone for Worker<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            delivery: self.delivery.clone(),
        }
    }
}

impl<C: Connection> Worker<C> {
    /// Creates a worker around an existing delivery sender.
    #[must_use]
    pub const fn new(id: WorkerId, delivery: mpsc::Sender<Dispatch<C>>) -> Self {
        Self { id, delivery }
    }

    /// Creates a worker together with its delivery receiver.
    ///
    /// The receiver side is what the hosting process hands to the actual
    /// worker transport (or polls directly in tests).
    ///
    /// # Panics
    /// Panics if `depth` is zero; a worker must be able to buffer at least
    /// one dispatch.
    #[must_use]
    pub fn channel(id: WorkerId, depth: usize) -> (Self, mpsc::Receiver<Dispatch<C>>) {
        assert!(depth > 0, "dispatch queue depth must be positive");
        let (tx, rx) = mpsc::channel(depth);
        (Self::new(id, tx), rx)
    }

    /// Returns this worker's id.
    #[must_use]
    pub const fn id(&self) -> WorkerId {
        self.id
    }

    /// Offers a dispatch without waiting for channel capacity.
    ///
    /// # Errors
    /// Returns the dispatch back if the channel is full or closed, so the
    /// connection inside is never lost on a failed delivery.
    pub fn try_deliver(
        &self,
        dispatch: Dispatch<C>,
    ) -> Result<(), mpsc::error::TrySendError<Dispatch<C>>> {
        self.delivery.try_send(dispatch)
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

    #[tokio::test]
    async fn test_delivery_carries_key_and_conn() {
        let (worker, mut rx) = Worker::channel(WorkerId::new(1), 4);
        let (reply_tx, _reply_rx) = oneshot::channel();

        worker
            .try_deliver(Dispatch {
                key: RoutingKey::new("k"),
                conn: FakeConn("10.0.0.9"),
                reply: reply_tx,
            })
            .unwrap();

        let dispatch = rx.recv().await.unwrap();
        assert_eq!(dispatch.key.as_str(), "k");
        assert_eq!(dispatch.conn.peer_address(), "10.0.0.9");
    }

    #[tokio::test]
    async fn test_failed_delivery_returns_dispatch() {
        let (worker, rx) = Worker::<FakeConn>::channel(WorkerId::new(2), 1);
        drop(rx);

        let (reply_tx, _reply_rx) = oneshot::channel();
        let result = worker.try_deliver(Dispatch {
            key: RoutingKey::new("k"),
            conn: FakeConn("10.0.0.9"),
            reply: reply_tx,
        });

        // The connection must come back out of the error.
        match result {
            Err(mpsc::error::TrySendError::Closed(dispatch)) => {
                assert_eq!(dispatch.conn.peer_address(), "10.0.0.9");
            }
            other => panic!("expected Closed, got {other:?}"),
        }
    }
}
