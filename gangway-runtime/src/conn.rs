//! The connection type produced by a production listening endpoint.

use gangway_core::Connection;
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;

/// A live connection accepted from a shared listener.
///
/// The router moves values of this type between owners; whoever holds one
/// owns the underlying socket, and dropping it closes the socket. Workers
/// match on the variant to get at the stream.
#[derive(Debug)]
pub enum SharedConn {
    /// A TCP connection.
    Tcp(TcpStream),
    /// A unix domain connection.
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Connection for SharedConn {
    fn peer_address(&self) -> String {
        match self {
            // The IP alone, not the ephemeral port: repeat connections from
            // one client must hash to the same bucket.
            Self::Tcp(stream) => stream
                .peer_addr()
                .map(|addr| addr.ip().to_string())
                .unwrap_or_default(),
            // Unix peers have no meaningful address.
            #[cfg(unix)]
            Self::Unix(_) => String::new(),
        }
    }
}
