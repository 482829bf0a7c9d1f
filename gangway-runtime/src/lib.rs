//! Gangway Runtime - production listening endpoint for the gangway router.
//!
//! This crate supplies the real system resources the routing core stays
//! abstract over: TCP and unix listeners (built through `socket2` so reuse
//! flags and backlog are explicit), inherited pre-bound descriptors, the
//! OS-error to [`gangway_core::BindCode`] translation table, and the
//! [`bind`] entry point that wires an endpoint task to its router.
//!
//! # Example
//!
//! ```ignore
//! use gangway_core::{Limits, RoutingKey, WorkerId};
//! use gangway_router::Worker;
//! use gangway_runtime::{bind, BindMode};
//!
//! let handle = bind(
//!     RoutingKey::new("tcp:0.0.0.0:8080"),
//!     BindMode::Tcp("0.0.0.0:8080".parse().unwrap()),
//!     Limits::new(),
//! );
//!
//! let (worker, dispatches) = Worker::channel(WorkerId::new(1), 256);
//! // Hand `dispatches` to the worker transport, then:
//! // let addr_info = handle.add(worker).await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod conn;
mod endpoint;
mod errno;

pub use conn::SharedConn;
pub use endpoint::{bind, BindMode, ListeningEndpoint};
pub use errno::translate;
