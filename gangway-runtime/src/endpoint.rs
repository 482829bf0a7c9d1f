//! The listening endpoint: one OS listening resource per routing key.
//!
//! The endpoint runs as its own task. It binds (asynchronously from the
//! caller's point of view), reports the outcome to the router, then forwards
//! every raw accept as an event - after binding, the router is the sole
//! owner of the resource and no other layer tracks it. The router closes
//! the endpoint through a [`Notify`] when its worker pool empties.
//!
//! # Bind Modes
//!
//! Exactly one per endpoint:
//! - an inherited, pre-bound TCP listener from the hosting process,
//! - a TCP address to bind here, or
//! - a unix socket path (removed again when the endpoint closes).

use std::net::SocketAddr;
#[cfg(unix)]
use std::path::PathBuf;
use std::sync::Arc;

use gangway_core::{Limits, RoutingKey};
use gangway_router::{EndpointEvent, RouterHandle};
use socket2::{Domain, Socket, Type};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::conn::SharedConn;
use crate::errno;

/// How the endpoint acquires its listening resource.
#[derive(Debug)]
pub enum BindMode {
    /// A listener the hosting process already bound (e.g. a descriptor
    /// inherited at spawn time).
    Inherited(std::net::TcpListener),
    /// Bind a TCP listener on this address.
    Tcp(SocketAddr),
    /// Bind a unix domain listener on this path.
    #[cfg(unix)]
    Path(PathBuf),
}

/// The listening endpoint task for one routing key.
pub struct ListeningEndpoint {
    key: RoutingKey,
    mode: BindMode,
    limits: Limits,
    events: mpsc::Sender<EndpointEvent<SharedConn>>,
    shutdown: Arc<Notify>,
}

/// The bound resource, by listener family.
enum BoundListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: UnixListener,
        path: PathBuf,
    },
}

impl BoundListener {
    /// The bound local address; `None` for path-based listeners.
    fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            Self::Unix { .. } => None,
        }
    }

    /// Accepts one connection.
    async fn accept(&self) -> std::io::Result<SharedConn> {
        match self {
            Self::Tcp(listener) => {
                let (stream, _) = listener.accept().await?;
                Ok(SharedConn::Tcp(stream))
            }
            #[cfg(unix)]
            Self::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                Ok(SharedConn::Unix(stream))
            }
        }
    }

    /// Releases the resource; unix listeners also remove their socket file.
    fn close(self) {
        #[cfg(unix)]
        if let Self::Unix { listener, path } = self {
            drop(listener);
            if let Err(err) = std::fs::remove_file(&path) {
                debug!(path = %path.display(), error = %err, "socket file not removed");
            }
        }
    }
}

impl ListeningEndpoint {
    /// Creates an endpoint, returning the event receiver and shutdown
    /// signal its router needs.
    #[must_use]
    pub fn new(
        key: RoutingKey,
        mode: BindMode,
        limits: Limits,
    ) -> (
        Self,
        mpsc::Receiver<EndpointEvent<SharedConn>>,
        Arc<Notify>,
    ) {
        let (events_tx, events_rx) = mpsc::channel(limits.endpoint_queue_depth as usize);
        let shutdown = Arc::new(Notify::new());

        let endpoint = Self {
            key,
            mode,
            limits,
            events: events_tx,
            shutdown: Arc::clone(&shutdown),
        };

        (endpoint, events_rx, shutdown)
    }

    /// Spawns the endpoint task. Binding starts immediately.
    pub fn start(self) {
        tokio::spawn(self.run());
    }

    async fn run(self) {
        let Self {
            key,
            mode,
            limits,
            events,
            shutdown,
        } = self;

        let listener = match Self::bind_listener(mode, &limits) {
            Ok(listener) => listener,
            Err(err) => {
                let code = errno::translate(&err);
                warn!(key = %key, error = %err, code = %code, "bind failed");
                let _ = events.send(EndpointEvent::BindFailed(code)).await;
                return;
            }
        };

        let local = listener.local_addr();
        info!(key = %key, addr = ?local, "endpoint listening");

        if events.send(EndpointEvent::Bound(local)).await.is_err() {
            // Router gone before the bind resolved.
            listener.close();
            return;
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let event = match accepted {
                        Ok(conn) => {
                            debug!(key = %key, "connection accepted");
                            EndpointEvent::Accepted(conn)
                        }
                        Err(err) => EndpointEvent::AcceptFailed(err),
                    };
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                () = shutdown.notified() => {
                    info!(key = %key, "endpoint closing");
                    break;
                }
            }
        }

        listener.close();
    }

    /// Acquires the listening resource for the configured mode.
    ///
    /// Consumes the mode: an inherited listener moves in whole, making the
    /// endpoint its single owner from here on.
    fn bind_listener(mode: BindMode, limits: &Limits) -> std::io::Result<BoundListener> {
        match mode {
            BindMode::Inherited(listener) => {
                listener.set_nonblocking(true)?;
                Ok(BoundListener::Tcp(TcpListener::from_std(listener)?))
            }
            BindMode::Tcp(addr) => {
                let listener = create_reusable_listener(addr, limits.listen_backlog)?;
                Ok(BoundListener::Tcp(listener))
            }
            #[cfg(unix)]
            BindMode::Path(path) => {
                let listener = UnixListener::bind(&path)?;
                Ok(BoundListener::Unix { listener, path })
            }
        }
    }
}

/// Creates a TCP listener with `SO_REUSEADDR` enabled.
///
/// This allows binding a port still in `TIME_WAIT` from a previous owner,
/// which matters when worker pools restart quickly.
fn create_reusable_listener(addr: SocketAddr, backlog: u32) -> std::io::Result<TcpListener> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    // On macOS/BSD, SO_REUSEPORT is what lets rapid rebinds through while
    // previous sockets are still closing.
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    socket.set_reuse_port(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog.min(i32::MAX as u32) as i32)?;

    let std_listener: std::net::TcpListener = socket.into();
    TcpListener::from_std(std_listener)
}

/// Binds a shared listening endpoint and spawns its router.
///
/// Returns immediately with a handle; the endpoint binds in the background
/// and workers added before the bind resolves are deferred until it does.
/// Must be called from within a tokio runtime.
///
/// # Panics
/// Panics if `limits` fails validation.
#[must_use]
pub fn bind(key: RoutingKey, mode: BindMode, limits: Limits) -> RouterHandle<SharedConn> {
    let (endpoint, events_rx, shutdown) = ListeningEndpoint::new(key.clone(), mode, limits);
    endpoint.start();
    gangway_router::spawn(key, limits, events_rx, shutdown)
}
