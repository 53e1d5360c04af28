//! The assertion object and its verification pipeline.
//!
//! An [`Assertion`] is what the browser's `navigator.credentials.get()`
//! returns, minus the credential id: authenticatorData, clientDataJSON and
//! a DER signature. The public key is *not* part of it. The ledger supplies
//! the registered key, so an attacker can't just bring their own.

use serde::{Deserialize, Serialize};

use crate::challenge::Challenge;
use crate::config::{RelyingPartyPolicy, COORDINATE_LENGTH};
use crate::crypto::keys::PublicKey;
use crate::crypto::verifier::SignatureVerifier;
use crate::error::AuthError;
use crate::webauthn::authenticator_data::AuthenticatorData;
use crate::webauthn::base64url;
use crate::webauthn::client_data::verify_binding_with_policy;
use crate::webauthn::der::decode_der_signature;
use crate::webauthn::message::reconstruct;

/// A WebAuthn assertion. Binary fields travel as unpadded base64url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    #[serde(rename = "authenticatorData", with = "base64url")]
    authenticator_data: Vec<u8>,
    #[serde(rename = "clientDataJSON", with = "base64url")]
    client_data_json: Vec<u8>,
    #[serde(with = "base64url")]
    signature: Vec<u8>,
}

/// Canonical, fixed-width fields extracted from an [`Assertion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedAssertion {
    pub authenticator_data: AuthenticatorData,
    pub r: [u8; COORDINATE_LENGTH],
    pub s: [u8; COORDINATE_LENGTH],
}

/// What a successful verification established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAssertion {
    /// `SHA-256(authenticatorData ‖ SHA-256(clientDataJSON))`; the replay
    /// record is keyed on this.
    pub message_hash: [u8; 32],
    pub sign_count: u32,
    pub user_verified: bool,
    pub origin: Option<String>,
}

impl Assertion {
    pub fn new(authenticator_data: Vec<u8>, client_data_json: Vec<u8>, signature: Vec<u8>) -> Self {
        Self {
            authenticator_data,
            client_data_json,
            signature,
        }
    }

    pub fn authenticator_data(&self) -> &[u8] {
        &self.authenticator_data
    }

    pub fn client_data_json(&self) -> &[u8] {
        &self.client_data_json
    }

    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    /// Structural decoding only: authenticatorData prefix and DER signature.
    pub fn decode(&self) -> Result<DecodedAssertion, AuthError> {
        let authenticator_data = AuthenticatorData::parse(&self.authenticator_data)?;
        let (r, s) = decode_der_signature(&self.signature)?;
        Ok(DecodedAssertion {
            authenticator_data,
            r,
            s,
        })
    }

    /// Full check of this assertion against an expected challenge and a
    /// registered key. Stages run in order and the first failure wins:
    ///
    /// 1. decode authenticatorData and the DER signature
    /// 2. clientData type, challenge binding, origin policy
    /// 3. UP / UV flags
    /// 4. rpIdHash, when the policy names an rpId
    /// 5. reconstruct the signed hash and verify it
    pub fn verify(
        &self,
        expected: &Challenge,
        public_key: &PublicKey,
        policy: &RelyingPartyPolicy,
        verifier: &SignatureVerifier,
    ) -> Result<VerifiedAssertion, AuthError> {
        let decoded = self.decode()?;

        let client_data = verify_binding_with_policy(&self.client_data_json, expected, policy)?;
        tracing::debug!(challenge = %expected, "client data bound to challenge");

        decoded
            .authenticator_data
            .check_flags(policy.require_user_verification)?;

        if let Some(rp_id) = policy.rp_id.as_deref() {
            if !decoded.authenticator_data.matches_rp_id(rp_id) {
                return Err(AuthError::RelyingPartyMismatch);
            }
        }

        let message_hash = reconstruct(&self.authenticator_data, &self.client_data_json);
        let verdict = verifier.evaluate(
            &message_hash,
            &decoded.r,
            &decoded.s,
            public_key.x(),
            public_key.y(),
        );
        if !verdict.is_valid() {
            tracing::debug!(%verdict, key = %public_key, "signature rejected");
            return Err(AuthError::InvalidSignature);
        }

        Ok(VerifiedAssertion {
            message_hash,
            sign_count: decoded.authenticator_data.sign_count(),
            user_verified: decoded.authenticator_data.user_verified(),
            origin: client_data.origin,
        })
    }
}
