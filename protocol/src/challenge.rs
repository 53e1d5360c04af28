//! # Challenge Binding
//!
//! The challenge is what ties a WebAuthn assertion to *one* operation at
//! *one* nonce. The client gets it from us, the authenticator signs over it
//! (inside clientDataJSON), and at authorization time we derive it again
//! from the request and the ledger's current nonce. If the two disagree the
//! assertion was made for something else.
//!
//! ## Preimage Layout
//!
//! ```text
//! version (1)
//! ‖ len(context) (u32 BE) ‖ context            "passgate/v1/<network>"
//! ‖ len(identity) (u32 BE) ‖ identity
//! ‖ tag (1)                                     0x01 transfer, 0x02 call, 0x03 rotate
//! ‖ operation fields                            see below
//! ‖ nonce (u64 BE)
//!
//! transfer:   len(target) ‖ target ‖ amount (u64 BE)
//! call:       len(target) ‖ target ‖ value (u64 BE) ‖ len(payload) ‖ payload
//! rotate_key: x (32) ‖ y (32)
//! ```
//!
//! Every variable-length field carries its length, so no two different
//! field splits produce the same bytes (`"ab" ‖ "c"` vs `"a" ‖ "bc"`).
//! The digest is BLAKE3. It is deliberately a different function from the
//! SHA-256 message hash the authenticator signs, so a challenge can never be
//! mistaken for a signed message.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::{RelyingPartyPolicy, CHALLENGE_ENCODING_VERSION, CHALLENGE_LENGTH};
use crate::crypto::hash::blake3_hash;
use crate::ledger::identity::IdentityId;
use crate::ledger::operation::Operation;

// ---------------------------------------------------------------------------
// Challenge
// ---------------------------------------------------------------------------

/// A 32-byte challenge digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Challenge([u8; CHALLENGE_LENGTH]);

impl Challenge {
    pub fn from_bytes(bytes: [u8; CHALLENGE_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CHALLENGE_LENGTH] {
        &self.0
    }

    /// Unpadded base64url, the form that appears in clientDataJSON.
    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Challenge({})", self.to_hex())
    }
}

impl Serialize for Challenge {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Challenge {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let bytes: [u8; CHALLENGE_LENGTH] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("challenge must be 32 bytes"))?;
        Ok(Self(bytes))
    }
}

// ---------------------------------------------------------------------------
// ChallengeBinder
// ---------------------------------------------------------------------------

/// Derives challenges for one context identifier (one network).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeBinder {
    context: String,
}

impl ChallengeBinder {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
        }
    }

    pub fn for_policy(policy: &RelyingPartyPolicy) -> Self {
        Self::new(policy.context_identifier())
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn bind(&self, identity: &IdentityId, operation: &Operation, nonce: u64) -> Challenge {
        bind(&self.context, identity, operation, nonce)
    }
}

/// `bind(context, identity, operation, nonce) -> Challenge`. Pure.
pub fn bind(context: &str, identity: &IdentityId, operation: &Operation, nonce: u64) -> Challenge {
    Challenge(blake3_hash(&encode_preimage(context, identity, operation, nonce)))
}

/// The exact bytes that get hashed into a challenge.
pub fn encode_preimage(
    context: &str,
    identity: &IdentityId,
    operation: &Operation,
    nonce: u64,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(128);
    out.push(CHALLENGE_ENCODING_VERSION);
    put_prefixed(&mut out, context.as_bytes());
    put_prefixed(&mut out, identity.as_bytes());
    out.push(operation.kind().tag());

    match operation {
        Operation::Transfer { target, amount } => {
            put_prefixed(&mut out, target.as_bytes());
            out.extend_from_slice(&amount.to_be_bytes());
        }
        Operation::Call {
            target,
            value,
            payload,
        } => {
            put_prefixed(&mut out, target.as_bytes());
            out.extend_from_slice(&value.to_be_bytes());
            put_prefixed(&mut out, payload);
        }
        Operation::RotateKey { new_key } => {
            out.extend_from_slice(new_key.x());
            out.extend_from_slice(new_key.y());
        }
    }

    out.extend_from_slice(&nonce.to_be_bytes());
    out
}

fn put_prefixed(out: &mut Vec<u8>, field: &[u8]) {
    // Fields are bounded well below u32::MAX (identity ≤ 64 B, payload ≤ 16 KiB).
    out.extend_from_slice(&(field.len() as u32).to_be_bytes());
    out.extend_from_slice(field);
}
