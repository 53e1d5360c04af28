//! Operations, authorization requests, and the authorized-operation
//! descriptor handed to the relay.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::challenge::Challenge;
use crate::config::MAX_CALL_PAYLOAD_BYTES;
use crate::crypto::keys::PublicKey;
use crate::error::AuthError;
use crate::ledger::identity::IdentityId;
use crate::webauthn::assertion::Assertion;

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A state-changing action an identity can authorize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Move `amount` from the authorizing identity's account to `target`.
    Transfer { target: IdentityId, amount: u64 },

    /// Invoke `target` with an opaque payload, attaching `value`.
    Call {
        target: IdentityId,
        value: u64,
        #[serde(with = "hex_payload")]
        payload: Vec<u8>,
    },

    /// Replace the identity's passkey. Signed by the *current* key and
    /// applied by the ledger itself; never relayed.
    RotateKey { new_key: PublicKey },
}

/// The discriminant of an [`Operation`], with its challenge tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Transfer,
    Call,
    RotateKey,
}

impl OperationKind {
    /// One-byte tag in the challenge preimage.
    pub fn tag(self) -> u8 {
        match self {
            Self::Transfer => 0x01,
            Self::Call => 0x02,
            Self::RotateKey => 0x03,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transfer => "transfer",
            Self::Call => "call",
            Self::RotateKey => "rotate_key",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Transfer { .. } => OperationKind::Transfer,
            Self::Call { .. } => OperationKind::Call,
            Self::RotateKey { .. } => OperationKind::RotateKey,
        }
    }

    /// Whether the relay executes this operation. Key rotation is ledger
    /// state and stops at the ledger.
    pub fn is_relayed(&self) -> bool {
        !matches!(self, Self::RotateKey { .. })
    }

    /// Static sanity checks that do not need ledger state.
    pub fn validate(&self, authorizer: &IdentityId) -> Result<(), AuthError> {
        match self {
            Self::Transfer { target, amount } => {
                if *amount == 0 {
                    return Err(AuthError::InvalidOperation("transfer amount is zero".into()));
                }
                if target == authorizer {
                    return Err(AuthError::InvalidOperation(
                        "transfer target is the authorizer".into(),
                    ));
                }
            }
            Self::Call { payload, .. } => {
                if payload.len() > MAX_CALL_PAYLOAD_BYTES {
                    return Err(AuthError::InvalidOperation(format!(
                        "call payload is {} bytes, maximum is {}",
                        payload.len(),
                        MAX_CALL_PAYLOAD_BYTES
                    )));
                }
            }
            Self::RotateKey { .. } => {}
        }
        Ok(())
    }
}

mod hex_payload {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let trimmed = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(trimmed).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// AuthorizationRequest
// ---------------------------------------------------------------------------

/// Everything a caller submits to get an operation authorized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub identity: IdentityId,
    pub operation: Operation,
    pub assertion: Assertion,
    /// Nonce the client fetched its challenge at. When present and no longer
    /// current, the request fails with `NonceStale` instead of the less
    /// specific `ChallengeMismatch`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_nonce: Option<u64>,
}

// ---------------------------------------------------------------------------
// AuthorizedOperation
// ---------------------------------------------------------------------------

/// Proof that the ledger accepted an operation. Immutable: fields are only
/// readable, and only the ledger constructs one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizedOperation {
    operation_id: Uuid,
    identity: IdentityId,
    operation: Operation,
    nonce: u64,
    challenge: Challenge,
    authorized_at: DateTime<Utc>,
}

impl AuthorizedOperation {
    pub(crate) fn new(
        identity: IdentityId,
        operation: Operation,
        nonce: u64,
        challenge: Challenge,
    ) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            identity,
            operation,
            nonce,
            challenge,
            authorized_at: Utc::now(),
        }
    }

    pub fn operation_id(&self) -> Uuid {
        self.operation_id
    }

    pub fn identity(&self) -> &IdentityId {
        &self.identity
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// The nonce this authorization consumed.
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn challenge(&self) -> &Challenge {
        &self.challenge
    }

    pub fn authorized_at(&self) -> DateTime<Utc> {
        self.authorized_at
    }
}
