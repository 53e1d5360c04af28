//! # Hashing Utilities
//!
//! Two hash functions, two jobs, and they must never be confused:
//!
//! - **SHA-256** — the platform's digest. WebAuthn authenticators sign
//!   `authenticatorData ‖ SHA-256(clientDataJSON)` with ES256, which hashes
//!   with SHA-256 again. We don't get a vote here; we match the platform.
//!
//! - **BLAKE3** — our own digest for challenges and replay records. Nothing
//!   outside PASSGATE ever needs to recompute these, so we use the faster hash.
//!
//! Both produce 32-byte outputs. The type system doesn't tell them apart,
//! so the function names do.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash and return a fixed-size array.
///
/// # Example
///
/// ```
/// use passgate_protocol::crypto::sha256;
///
/// let hash = sha256(b"PASSGATE");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// SHA-256 over several slices fed sequentially, without a temporary buffer.
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Compute the BLAKE3 hash of the input data.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Compute a domain-separated hash using BLAKE3's `derive_key` mode.
///
/// `domain_separated_hash("a", data)` and `domain_separated_hash("b", data)`
/// never collide, because the context picks a different internal IV.
pub fn domain_separated_hash(context: &str, data: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(context);
    hasher.update(data);
    *hasher.finalize().as_bytes()
}
