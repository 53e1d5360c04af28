//! # WebAuthn Assertion Handling
//!
//! Everything between "the browser gave us a blob" and "here are the five
//! numbers the curve check needs":
//!
//! ```text
//! der.rs                — ECDSA DER signature  <->  fixed-width (r, s)
//! cose.rs               — COSE_Key / SEC1 point  ->  PublicKey
//! authenticator_data.rs — rpIdHash, flags, signCount
//! client_data.rs        — clientDataJSON challenge binding (structured)
//! message.rs            — SHA-256(authData ‖ SHA-256(clientData))
//! assertion.rs          — the Assertion type and the full pipeline
//! ```
//!
//! All decoders are pure functions over byte slices. They return errors
//! for every malformed input and never panic; the property tests throw
//! arbitrary bytes at them to keep it that way.

pub mod assertion;
pub mod authenticator_data;
pub mod client_data;
pub mod cose;
pub mod der;
pub mod message;

pub use assertion::{Assertion, DecodedAssertion, VerifiedAssertion};
pub use authenticator_data::AuthenticatorData;
pub use client_data::{binds, verify_binding, verify_binding_with_policy, CollectedClientData};
pub use cose::{decode_cose_key, decode_public_key, decode_sec1_key};
pub use der::{decode_der_signature, encode_der_signature};
pub use message::reconstruct;

/// Serde adapter for binary fields carried as unpadded base64url.
pub mod base64url {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        URL_SAFE_NO_PAD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
