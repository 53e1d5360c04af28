//! Signed-message reconstruction.
//!
//! A WebAuthn authenticator does not sign the challenge. It signs
//!
//! ```text
//! authenticatorData ‖ SHA-256(clientDataJSON)
//! ```
//!
//! with ES256, i.e. ECDSA over the SHA-256 of those bytes. To verify we
//! rebuild that digest from the raw assertion fields, byte for byte.

use crate::crypto::hash::{sha256, sha256_multi};

/// `SHA-256(authenticatorData ‖ SHA-256(clientDataJSON))`.
pub fn reconstruct(authenticator_data: &[u8], client_data_json: &[u8]) -> [u8; 32] {
    let client_data_hash = sha256(client_data_json);
    sha256_multi(&[authenticator_data, &client_data_hash[..]])
}
