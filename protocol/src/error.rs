//! Authorization error taxonomy.
//!
//! Every stage of the pipeline fails closed with one of these. They are all
//! terminal: the caller must fetch a fresh challenge (current nonce), get a
//! fresh assertion, and try again end to end. The core never retries.
//!
//! Two views of the same error:
//!
//! - [`AuthError::reason`] — the precise internal label. Goes to logs and
//!   metrics.
//! - [`AuthError::public_class`] — what an untrusted caller gets to see.
//!   "Wrong key", "bad DER" and "primitive said no" all collapse into
//!   `invalid_signature`, so the API is not a free signature-debugging oracle.

use thiserror::Error;

use crate::storage::db::DbError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// The public key encoding could not be decoded into a P-256 point.
    #[error("malformed public key: {0}")]
    MalformedKey(String),

    /// The DER signature failed structural decoding.
    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    /// authenticatorData or clientDataJSON failed structural decoding.
    #[error("malformed assertion: {0}")]
    MalformedAssertion(String),

    /// clientData does not carry the challenge derived for this operation
    /// and the identity's current nonce.
    #[error("challenge mismatch")]
    ChallengeMismatch,

    /// clientData origin is not on the relying party allow-list.
    #[error("origin not allowed: {0}")]
    OriginMismatch(String),

    /// authenticatorData rpIdHash does not match the configured rpId.
    #[error("relying party id hash mismatch")]
    RelyingPartyMismatch,

    /// UP (or UV, when required) flag not set.
    #[error("user presence/verification flag missing")]
    UserPresenceMissing,

    /// Range check or curve verification failed, or the signature was
    /// already consumed.
    #[error("invalid signature")]
    InvalidSignature,

    #[error("identity not registered: {0}")]
    IdentityNotRegistered(String),

    #[error("identity already registered: {0}")]
    AlreadyRegistered(String),

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The caller pinned a nonce that is no longer current.
    #[error("stale nonce: current is {current}, request pinned {provided}")]
    NonceStale { current: u64, provided: u64 },

    #[error("storage error: {0}")]
    Storage(#[from] DbError),
}

impl AuthError {
    /// Precise, internal reason label (logs, metrics, tests).
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MalformedKey(_) => "malformed_key",
            Self::MalformedSignature(_) => "malformed_signature",
            Self::MalformedAssertion(_) => "malformed_assertion",
            Self::ChallengeMismatch => "challenge_mismatch",
            Self::OriginMismatch(_) => "origin_mismatch",
            Self::RelyingPartyMismatch => "rp_id_mismatch",
            Self::UserPresenceMissing => "user_presence_missing",
            Self::InvalidSignature => "invalid_signature",
            Self::IdentityNotRegistered(_) => "identity_not_registered",
            Self::AlreadyRegistered(_) => "already_registered",
            Self::InvalidIdentity(_) => "invalid_identity",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::NonceStale { .. } => "nonce_stale",
            Self::Storage(_) => "storage",
        }
    }

    /// Coarse class safe to return to an untrusted network caller.
    pub fn public_class(&self) -> &'static str {
        match self {
            Self::MalformedSignature(_)
            | Self::MalformedAssertion(_)
            | Self::RelyingPartyMismatch
            | Self::UserPresenceMissing
            | Self::InvalidSignature => "invalid_signature",
            Self::ChallengeMismatch | Self::OriginMismatch(_) | Self::NonceStale { .. } => {
                "challenge_mismatch"
            }
            Self::MalformedKey(_) => "malformed_key",
            Self::IdentityNotRegistered(_) => "identity_not_registered",
            Self::AlreadyRegistered(_) => "already_registered",
            Self::InvalidIdentity(_) | Self::InvalidOperation(_) => "invalid_request",
            Self::Storage(_) => "internal_error",
        }
    }

    /// Whether this error is a verdict on the assertion (as opposed to a
    /// bad request or an infrastructure failure).
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            Self::InvalidIdentity(_) | Self::InvalidOperation(_) | Self::Storage(_)
        )
    }
}
