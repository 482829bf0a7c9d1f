//! Integration tests for the production endpoint.
//!
//! These tests drive the full stack: real listeners, real clients, and a
//! router handing live sockets to workers.

use std::net::SocketAddr;
#[cfg(unix)]
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use gangway_core::{BindCode, Connection, Limits, RoutingKey, WorkerId};
use gangway_router::{AddError, Dispatch, DispatchReply, Worker};
use gangway_runtime::{bind, BindMode, SharedConn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Counter for unique socket path names.
#[cfg(unix)]
static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Creates a unique unix socket path for one test.
#[cfg(unix)]
fn test_socket_path() -> std::path::PathBuf {
    let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "gangway-test-{}-{counter}.sock",
        std::process::id()
    ))
}

#[tokio::test]
async fn test_tcp_end_to_end() {
    let handle = bind(
        RoutingKey::new("tcp-e2e"),
        BindMode::Tcp("127.0.0.1:0".parse().unwrap()),
        Limits::new(),
    );

    let (worker, mut dispatches) = Worker::channel(WorkerId::new(1), 8);
    let addr = handle
        .add(worker)
        .await
        .expect("add should succeed")
        .expect("TCP listeners have an address");
    assert_ne!(addr.port(), 0);

    // A real client connects and speaks first.
    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(b"ping").await.unwrap();

    let Dispatch { key, conn, reply } = timeout(Duration::from_secs(2), dispatches.recv())
        .await
        .expect("dispatch should arrive")
        .expect("channel open");

    assert_eq!(key.as_str(), "tcp-e2e");
    assert_eq!(conn.peer_address(), "127.0.0.1");

    // The worker owns a live socket: the client's bytes are readable.
    let SharedConn::Tcp(mut stream) = conn else {
        panic!("expected a TCP connection");
    };
    let _ = reply.send(DispatchReply::Accepted);

    let mut buf = [0u8; 4];
    timeout(Duration::from_secs(2), stream.read_exact(&mut buf))
        .await
        .expect("read should complete")
        .unwrap();
    assert_eq!(&buf, b"ping");
}

#[tokio::test]
async fn test_bound_port_conflict_surfaces_addr_in_use() {
    // Occupy a port, then ask the endpoint to bind it.
    let occupier = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr: SocketAddr = occupier.local_addr().unwrap();

    let handle = bind(RoutingKey::new("conflict"), BindMode::Tcp(addr), Limits::new());

    let (worker, _dispatches) = Worker::<SharedConn>::channel(WorkerId::new(1), 8);
    let result = timeout(Duration::from_secs(2), handle.add(worker))
        .await
        .expect("add should resolve");

    assert_eq!(result, Err(AddError::Bind(BindCode::AddrInUse)));
}

#[tokio::test]
async fn test_inherited_listener_is_served() {
    // The hosting process binds; the endpoint takes the descriptor over.
    let inherited = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let expected_addr = inherited.local_addr().unwrap();

    let handle = bind(
        RoutingKey::new("inherited"),
        BindMode::Inherited(inherited),
        Limits::new(),
    );

    let (worker, mut dispatches) = Worker::channel(WorkerId::new(1), 8);
    let addr = handle.add(worker).await.unwrap().unwrap();
    assert_eq!(addr, expected_addr);

    let _client = TcpStream::connect(addr).await.unwrap();
    let dispatch = timeout(Duration::from_secs(2), dispatches.recv())
        .await
        .expect("dispatch should arrive")
        .expect("channel open");
    let _ = dispatch.reply.send(DispatchReply::Accepted);
}

#[cfg(unix)]
#[tokio::test]
async fn test_unix_path_listener_round_trip() {
    use tokio::net::UnixStream;

    let path = test_socket_path();
    let handle = bind(
        RoutingKey::new("unix"),
        BindMode::Path(path.clone()),
        Limits::new(),
    );

    let (worker, mut dispatches) = Worker::channel(WorkerId::new(1), 8);
    // Path listeners have no address/port pair to report.
    let addr = handle.add(worker).await.unwrap();
    assert_eq!(addr, None);

    let _client = UnixStream::connect(&path).await.unwrap();
    let Dispatch { conn, reply, .. } = timeout(Duration::from_secs(2), dispatches.recv())
        .await
        .expect("dispatch should arrive")
        .expect("channel open");

    assert_eq!(conn.peer_address(), "");
    assert!(matches!(conn, SharedConn::Unix(_)));
    let _ = reply.send(DispatchReply::Accepted);

    // Removing the last worker closes the endpoint and removes the socket
    // file.
    assert!(handle.remove(WorkerId::new(1)).await);
    timeout(Duration::from_secs(2), async {
        while path.exists() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("socket file should be removed");
}

#[cfg(unix)]
#[tokio::test]
async fn test_stale_socket_path_surfaces_addr_in_use() {
    let path = test_socket_path();
    // Another listener already owns the path.
    let _occupier = std::os::unix::net::UnixListener::bind(&path).unwrap();

    let handle = bind(
        RoutingKey::new("stale-path"),
        BindMode::Path(path.clone()),
        Limits::new(),
    );

    let (worker, _dispatches) = Worker::<SharedConn>::channel(WorkerId::new(1), 8);
    let result = timeout(Duration::from_secs(2), handle.add(worker))
        .await
        .expect("add should resolve");

    assert_eq!(result, Err(AddError::Bind(BindCode::AddrInUse)));
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn test_sticky_routing_over_real_sockets() {
    // Loopback clients all share one peer IP, so with any pool size they
    // must all land on the same worker.
    let handle = bind(
        RoutingKey::new("sticky"),
        BindMode::Tcp("127.0.0.1:0".parse().unwrap()),
        Limits::new(),
    );

    let (worker1, mut rx1) = Worker::channel(WorkerId::new(1), 32);
    let (worker2, mut rx2) = Worker::channel(WorkerId::new(2), 32);
    let addr = handle.add(worker1).await.unwrap().unwrap();
    handle.add(worker2).await.unwrap();

    let mut clients = Vec::new();
    for _ in 0..4 {
        clients.push(TcpStream::connect(addr).await.unwrap());
    }

    // Auto-accept on both workers, counting deliveries.
    let mut to_worker1 = 0;
    let mut to_worker2 = 0;
    for _ in 0..4 {
        tokio::select! {
            Some(d) = rx1.recv() => { let _ = d.reply.send(DispatchReply::Accepted); to_worker1 += 1; }
            Some(d) = rx2.recv() => { let _ = d.reply.send(DispatchReply::Accepted); to_worker2 += 1; }
            () = tokio::time::sleep(Duration::from_secs(2)) => panic!("dispatch missing"),
        }
    }

    // One peer address, one worker: all four on the same side.
    assert!(
        (to_worker1 == 4 && to_worker2 == 0) || (to_worker1 == 0 && to_worker2 == 4),
        "expected all dispatches on one worker, got {to_worker1}/{to_worker2}"
    );
}
