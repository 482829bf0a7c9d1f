//! Gangway Router - sticky routing of accepted connections to a worker pool.
//!
//! This crate is the coordination core: it decides which worker an accepted
//! connection belongs to (hash of the peer address against the join-ordered
//! worker list), drives the asynchronous handoff/acknowledgement protocol,
//! and absorbs workers joining, leaving, or transiently refusing work.
//!
//! Endpoint events arrive over a channel ([`EndpointEvent`]), so the crate
//! has no socket dependency of its own - the production listening endpoint
//! lives in `gangway-runtime`, and tests drive the channel directly.
//!
//! # Design
//!
//! - **Sticky hashing**: one peer, one worker, while membership is stable
//! - **Single task**: operations run to completion, no locks
//! - **Single owner**: a connection is queued, in flight, or worker-owned,
//!   never two at once

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod hash;
mod queue;
mod registry;
mod router;
mod worker;

pub use queue::{Pending, PendingQueue};
pub use registry::{RemoveOutcome, WorkerRegistry};
pub use router::{spawn, AddError, EndpointEvent, RouterHandle};
pub use worker::{Dispatch, DispatchReply, Worker};
