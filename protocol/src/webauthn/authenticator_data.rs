//! authenticatorData parsing.
//!
//! ```text
//! rpIdHash (32) ‖ flags (1) ‖ signCount (u32 BE) ‖ [attested credential data] ‖ [extensions]
//! ```
//!
//! Only the fixed 37-byte prefix is interpreted. Anything after it is
//! covered by the signature (it is part of the signed bytes) but otherwise
//! ignored.

use crate::config::{
    AUTHENTICATOR_DATA_MIN_LENGTH, FLAG_USER_PRESENT, FLAG_USER_VERIFIED,
    MAX_AUTHENTICATOR_DATA_LENGTH,
};
use crate::crypto::hash::sha256;
use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatorData {
    rp_id_hash: [u8; 32],
    flags: u8,
    sign_count: u32,
}

impl AuthenticatorData {
    pub fn parse(bytes: &[u8]) -> Result<Self, AuthError> {
        if bytes.len() < AUTHENTICATOR_DATA_MIN_LENGTH {
            return Err(AuthError::MalformedAssertion(format!(
                "authenticator data is {} bytes, minimum is {}",
                bytes.len(),
                AUTHENTICATOR_DATA_MIN_LENGTH
            )));
        }
        if bytes.len() > MAX_AUTHENTICATOR_DATA_LENGTH {
            return Err(AuthError::MalformedAssertion(format!(
                "authenticator data is {} bytes, maximum is {}",
                bytes.len(),
                MAX_AUTHENTICATOR_DATA_LENGTH
            )));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&bytes[..32]);
        let flags = bytes[32];
        let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
        })
    }

    pub fn rp_id_hash(&self) -> &[u8; 32] {
        &self.rp_id_hash
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn sign_count(&self) -> u32 {
        self.sign_count
    }

    pub fn user_present(&self) -> bool {
        self.flags & FLAG_USER_PRESENT != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_USER_VERIFIED != 0
    }

    /// UP is always required; UV only when the policy says so.
    pub fn check_flags(&self, require_user_verification: bool) -> Result<(), AuthError> {
        if !self.user_present() {
            return Err(AuthError::UserPresenceMissing);
        }
        if require_user_verification && !self.user_verified() {
            return Err(AuthError::UserPresenceMissing);
        }
        Ok(())
    }

    pub fn matches_rp_id(&self, rp_id: &str) -> bool {
        self.rp_id_hash == sha256(rp_id.as_bytes())
    }
}
