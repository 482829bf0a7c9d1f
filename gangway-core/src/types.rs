//! Strongly-typed identifiers for gangway entities.
//!
//! Explicit wrapper types prevent bugs from mixing up IDs. All IDs are
//! 64-bit so hosting processes can mint them freely for the lifetime of a
//! deployment.

use std::fmt;
use std::sync::Arc;

/// Macro to generate strongly-typed ID wrappers.
///
/// Each ID type wraps a u64 and provides:
/// - Type safety (can't mix `WorkerId` with `ConnectionId`)
/// - Debug/Display formatting
/// - Zero-cost abstraction (same as raw u64)
macro_rules! define_id {
    ($name:ident, $prefix:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[repr(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Creates a new ID from a raw u64 value.
            #[inline]
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw u64 value.
            #[inline]
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }

            /// Returns the next ID in sequence.
            ///
            /// # Panics
            /// Panics if the ID would overflow.
            #[inline]
            #[must_use]
            pub const fn next(self) -> Self {
                assert!(self.0 < u64::MAX, "ID overflow");
                Self(self.0 + 1)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $prefix, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}-{}", $prefix, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.get()
            }
        }
    };
}

define_id!(WorkerId, "worker", "Unique identifier for a worker process sharing a listener.");
define_id!(ConnectionId, "conn", "Identifier assigned to an accepted connection for log correlation.");

/// Opaque identifier correlating one shared listener with the workers
/// entitled to its traffic.
///
/// Routing keys are immutable and cheap to clone; one copy travels with
/// every dispatched connection.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RoutingKey(Arc<str>);

impl RoutingKey {
    /// Creates a routing key from any string-like value.
    pub fn new(key: impl Into<String>) -> Self {
        Self(Arc::from(key.into()))
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoutingKey({})", self.0)
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RoutingKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_type_safety() {
        let worker = WorkerId::new(1);
        let conn = ConnectionId::new(1);

        // These are different types even with same value.
        assert_eq!(worker.get(), conn.get());
        // But they can't be compared directly (won't compile):
        // assert_ne!(worker, conn);
    }

    #[test]
    fn test_id_display() {
        let worker = WorkerId::new(42);
        assert_eq!(format!("{worker}"), "worker-42");
        assert_eq!(format!("{worker:?}"), "worker(42)");
    }

    #[test]
    fn test_id_next() {
        let id = ConnectionId::new(0);
        assert_eq!(id.next().get(), 1);
        assert_eq!(id.next().next().get(), 2);
    }

    #[test]
    #[should_panic(expected = "ID overflow")]
    fn test_id_overflow_panics() {
        let id = ConnectionId::new(u64::MAX);
        let _ = id.next();
    }

    #[test]
    fn test_routing_key_is_opaque_text() {
        let key = RoutingKey::new("tcp:0.0.0.0:8080");
        assert_eq!(key.as_str(), "tcp:0.0.0.0:8080");
        assert_eq!(format!("{key}"), "tcp:0.0.0.0:8080");
    }

    #[test]
    fn test_routing_key_clones_compare_equal() {
        let key = RoutingKey::new("shared");
        let copy = key.clone();
        assert_eq!(key, copy);
    }
}
