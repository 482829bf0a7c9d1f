//! Peer-address hashing for sticky routing.
//!
//! The bucket function is the whole affinity story: for a fixed worker list
//! of length N, every connection from one peer lands on index
//! `hash(peer) mod N`. Stability across calls and processes is what lets a
//! client keep hitting the same worker; any membership change reshuffles
//! every bucket assignment.

use xxhash_rust::xxh3::xxh3_64;

/// Hashes a peer address string to a stable 64-bit value.
///
/// The empty string (peers without a readable address) is a valid input and
/// hashes like any other, so addressless connections still route
/// deterministically.
#[must_use]
pub fn hash_peer(addr: &str) -> u64 {
    xxh3_64(addr.as_bytes())
}

/// Maps a peer address onto a bucket in `0..len`.
///
/// Returns `None` when `len` is zero - there is no modulus target and the
/// caller has no worker to pick.
#[must_use]
pub fn bucket(addr: &str, len: usize) -> Option<usize> {
    if len == 0 {
        return None;
    }
    // u64 -> usize truncation is fine: the modulus already fits in len.
    Some((hash_peer(addr) % len as u64) as usize)
}
