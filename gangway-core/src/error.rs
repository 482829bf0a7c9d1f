//! Platform-abstracted bind failure codes.
//!
//! A listening endpoint that fails to acquire its OS resource reports one of
//! these codes instead of a raw OS error, so every platform surfaces the
//! same vocabulary to callers. The mapping from OS errors lives with the
//! endpoint; this is the shared code set.

use std::fmt;

/// Why a listening endpoint could not bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindCode {
    /// The address (or socket path) is already in use.
    AddrInUse,
    /// The process lacks permission for the address (e.g. privileged port).
    AccessDenied,
    /// The requested address is not local to this host.
    AddrNotAvailable,
    /// The bind target was malformed or unsupported.
    InvalidInput,
    /// The process or system is out of file descriptors.
    TooManyOpenFiles,
    /// Any other platform error.
    Unknown,
}

impl BindCode {
    /// Returns the conventional errno-style name for this code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::AddrInUse => "EADDRINUSE",
            Self::AccessDenied => "EACCES",
            Self::AddrNotAvailable => "EADDRNOTAVAIL",
            Self::InvalidInput => "EINVAL",
            Self::TooManyOpenFiles => "EMFILE",
            Self::Unknown => "EUNKNOWN",
        }
    }
}

impl fmt::Display for BindCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
