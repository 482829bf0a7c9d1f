//! Translation of OS bind errors to platform-abstracted codes.
//!
//! The mapping is explicit static data, not scattered conversions: one table
//! for the error kinds the standard library classifies, and one for raw
//! errno values that have no stable `io::ErrorKind` yet.

use std::io;

use gangway_core::BindCode;

/// Error kinds the standard library classifies, in lookup order.
const KIND_TABLE: &[(io::ErrorKind, BindCode)] = &[
    (io::ErrorKind::AddrInUse, BindCode::AddrInUse),
    (io::ErrorKind::PermissionDenied, BindCode::AccessDenied),
    (io::ErrorKind::AddrNotAvailable, BindCode::AddrNotAvailable),
    (io::ErrorKind::InvalidInput, BindCode::InvalidInput),
    // A unix socket path that already exists surfaces as AlreadyExists;
    // semantically the address is in use.
    (io::ErrorKind::AlreadyExists, BindCode::AddrInUse),
];

/// Raw errno values without a stable `io::ErrorKind`.
///
/// The numbers agree across Linux and the BSD family (including macOS).
#[cfg(unix)]
const RAW_TABLE: &[(i32, BindCode)] = &[
    (23, BindCode::TooManyOpenFiles), // ENFILE
    (24, BindCode::TooManyOpenFiles), // EMFILE
];

/// Translates a bind failure into its platform-abstracted code.
///
/// Unmapped errors degrade to [`BindCode::Unknown`] rather than guessing.
#[must_use]
pub fn translate(err: &io::Error) -> BindCode {
    for (kind, code) in KIND_TABLE {
        if err.kind() == *kind {
            return *code;
        }
    }

    #[cfg(unix)]
    if let Some(raw) = err.raw_os_error() {
        for (errno, code) in RAW_TABLE {
            if raw == *errno {
                return *code;
            }
        }
    }

    BindCode::Unknown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addr_in_use() {
        let err = io::Error::new(io::ErrorKind::AddrInUse, "in use");
        assert_eq!(translate(&err), BindCode::AddrInUse);
        assert_eq!(translate(&err).code(), "EADDRINUSE");
    }

    #[test]
    fn test_permission_denied() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(translate(&err), BindCode::AccessDenied);
    }

    #[test]
    fn test_stale_socket_path_is_addr_in_use() {
        let err = io::Error::new(io::ErrorKind::AlreadyExists, "path exists");
        assert_eq!(translate(&err), BindCode::AddrInUse);
    }

    #[cfg(unix)]
    #[test]
    fn test_fd_exhaustion_from_raw_errno() {
        let err = io::Error::from_raw_os_error(24);
        assert_eq!(translate(&err), BindCode::TooManyOpenFiles);
    }

    #[test]
    fn test_unmapped_degrades_to_unknown() {
        let err = io::Error::new(io::ErrorKind::TimedOut, "odd");
        assert_eq!(translate(&err), BindCode::Unknown);
    }
}
