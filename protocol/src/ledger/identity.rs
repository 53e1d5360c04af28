//! Identities and their ledger records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MAX_IDENTITY_LENGTH;
use crate::crypto::keys::PublicKey;
use crate::error::AuthError;

// ---------------------------------------------------------------------------
// IdentityId
// ---------------------------------------------------------------------------

/// Name of an authorizer (and of the account it controls).
///
/// 1 to 64 bytes of `[A-Za-z0-9._-]`. The charset keeps identities safe to
/// drop into URLs, log lines and sled keys without escaping. Validated on
/// every construction path, serde included.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Result<Self, AuthError> {
        let id = id.into();
        if id.is_empty() {
            return Err(AuthError::InvalidIdentity("identity is empty".into()));
        }
        if id.len() > MAX_IDENTITY_LENGTH {
            return Err(AuthError::InvalidIdentity(format!(
                "identity is {} bytes, maximum is {}",
                id.len(),
                MAX_IDENTITY_LENGTH
            )));
        }
        if let Some(bad) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(AuthError::InvalidIdentity(format!(
                "identity contains invalid character {bad:?}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<String> for IdentityId {
    type Error = AuthError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<IdentityId> for String {
    fn from(id: IdentityId) -> Self {
        id.0
    }
}

impl FromStr for IdentityId {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for IdentityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// IdentityRecord
// ---------------------------------------------------------------------------

/// What the ledger knows about a registered identity.
///
/// Presence in the ledger *is* the `Registered` state; there is no record
/// for an unregistered identity and records are never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Current passkey. Only an authorized `RotateKey` replaces it.
    pub public_key: PublicKey,
    /// Number of operations this identity has authorized so far. The next
    /// challenge is bound to this value.
    pub nonce: u64,
    pub registered_at: DateTime<Utc>,
    pub key_rotations: u32,
}

impl IdentityRecord {
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            nonce: 0,
            registered_at: Utc::now(),
            key_rotations: 0,
        }
    }
}
