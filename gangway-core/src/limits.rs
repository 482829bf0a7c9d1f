//! System limits and configuration bounds.
//!
//! Put limits on everything: every queue and channel in the router has an
//! explicit maximum size, so a stalled worker or an accept burst degrades
//! predictably instead of growing without bound.

/// System-wide limits for a gangway router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum accepted-but-unassigned connections held in the pending
    /// queue. Accepts beyond this are shed.
    pub max_pending_connections: u32,
    /// Maximum undelivered dispatches buffered per worker channel.
    pub dispatch_queue_depth: u32,
    /// Maximum buffered control commands (add/remove) per router.
    pub command_queue_depth: u32,
    /// Maximum buffered endpoint events (binds, accepts) per router.
    pub endpoint_queue_depth: u32,
    /// Listen backlog for TCP and unix listeners.
    pub listen_backlog: u32,
}

impl Limits {
    /// Creates limits with safe defaults.
    ///
    /// Defaults are conservative; hosts with very large worker pools or
    /// bursty accept rates should tune them.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_pending_connections: 4096,
            dispatch_queue_depth: 256,
            command_queue_depth: 64,
            endpoint_queue_depth: 1024,
            listen_backlog: 128,
        }
    }

    /// Validates that all limits are usable.
    ///
    /// # Errors
    /// Returns a description of the first zero-sized bound found; every
    /// queue must admit at least one element or the router cannot move
    /// connections at all.
    pub const fn validate(&self) -> Result<(), &'static str> {
        if self.max_pending_connections == 0 {
            return Err("max_pending_connections must be positive");
        }
        if self.dispatch_queue_depth == 0 {
            return Err("dispatch_queue_depth must be positive");
        }
        if self.command_queue_depth == 0 {
            return Err("command_queue_depth must be positive");
        }
        if self.endpoint_queue_depth == 0 {
            return Err("endpoint_queue_depth must be positive");
        }
        if self.listen_backlog == 0 {
            return Err("listen_backlog must be positive");
        }
        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}
