//! Gangway Core - Strongly-typed identifiers and shared vocabulary for the
//! gangway connection router.
//!
//! This crate has no dependencies and defines the types every other gangway
//! crate speaks: worker and connection identifiers, the routing key that ties
//! a shared listener to its worker pool, the [`Connection`] handle trait, the
//! platform-abstracted bind error codes, and explicit system limits.
//!
//! # Design Principles
//!
//! - **Strongly-typed IDs**: a `WorkerId` is not a `ConnectionId`
//! - **Explicit limits**: every queue has a bounded maximum
//! - **No unsafe code**

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod conn;
mod error;
mod limits;
mod types;

pub use conn::Connection;
pub use error::BindCode;
pub use limits::Limits;
pub use types::{ConnectionId, RoutingKey, WorkerId};
