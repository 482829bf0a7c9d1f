//! The connection handle abstraction the router moves between owners.

/// An accepted connection whose ownership flows through the router.
///
/// The router never reads or writes a connection; it only needs the remote
/// peer's address to pick a worker, and it closes a connection by dropping
/// it. Implementations wrap whatever the listening endpoint accepts (TCP or
/// unix streams in production, plain structs in tests).
pub trait Connection: Send + 'static {
    /// Returns the remote peer's address string.
    ///
    /// For TCP this is the peer IP without the port, so repeat connections
    /// from one client hash to the same bucket. Returns an empty string when
    /// no address is available (unix sockets, torn-down peers).
    fn peer_address(&self) -> String;
}
