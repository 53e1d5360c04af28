//! # Test Fixtures
//!
//! [`SoftAuthenticator`] is a software passkey: a P-256 signing key that
//! produces real WebAuthn assertions (authenticatorData, clientDataJSON and
//! a DER signature) the same way a platform authenticator would. It exists
//! so the rest of the crate can be tested against genuine signatures instead
//! of hand-copied vectors.
//!
//! Compiled for unit tests and behind the `test-utils` feature for
//! integration tests, benches and the node's API tests. Never ship it.

use std::sync::atomic::{AtomicU32, Ordering};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use rand_core::OsRng;

use crate::challenge::Challenge;
use crate::config::{CLIENT_DATA_TYPE_GET, FLAG_USER_PRESENT, FLAG_USER_VERIFIED};
use crate::crypto::hash::sha256;
use crate::crypto::keys::PublicKey;
use crate::webauthn::assertion::Assertion;

/// Relying party the fixtures claim to be, unless told otherwise.
pub const TEST_RP_ID: &str = "passgate.test";

/// Origin written into fixture clientData, unless told otherwise.
pub const TEST_ORIGIN: &str = "https://passgate.test";

/// A software P-256 authenticator.
pub struct SoftAuthenticator {
    signing_key: SigningKey,
    rp_id: String,
    origin: String,
    sign_count: AtomicU32,
}

impl SoftAuthenticator {
    /// Fresh random key bound to [`TEST_RP_ID`] / [`TEST_ORIGIN`].
    pub fn generate() -> Self {
        Self::with_relying_party(TEST_RP_ID, TEST_ORIGIN)
    }

    /// Fresh random key bound to a specific relying party and origin.
    pub fn with_relying_party(rp_id: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
            rp_id: rp_id.into(),
            origin: origin.into(),
            sign_count: AtomicU32::new(0),
        }
    }

    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The registered half of the passkey.
    pub fn public_key(&self) -> PublicKey {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        x.copy_from_slice(point.x().expect("uncompressed point has x"));
        y.copy_from_slice(point.y().expect("uncompressed point has y"));
        PublicKey::from_coordinates(x, y).expect("generated key is on the curve")
    }

    /// The public key as a COSE_Key map (EC2 / ES256 / P-256), the way it
    /// appears in a registration's attested credential data.
    pub fn cose_key(&self) -> Vec<u8> {
        let pk = self.public_key();
        let mut out = vec![
            0xA5, // map(5)
            0x01, 0x02, // kty: EC2
            0x03, 0x26, // alg: ES256 (-7)
            0x20, 0x01, // crv: P-256
            0x21, 0x58, 0x20, // x: bstr(32)
        ];
        out.extend_from_slice(pk.x());
        out.extend_from_slice(&[0x22, 0x58, 0x20]); // y: bstr(32)
        out.extend_from_slice(pk.y());
        out
    }

    /// Sign an already-hashed message, returning fixed-width `(r, s)`.
    pub fn sign_prehash(&self, hash: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
        let signature: Signature = self
            .signing_key
            .sign_prehash(hash)
            .expect("32-byte prehash is always signable");
        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        (r, s)
    }

    /// Same as [`sign_prehash`](Self::sign_prehash), DER-encoded by `p256`.
    pub fn sign_prehash_der(&self, hash: &[u8; 32]) -> Vec<u8> {
        let signature: Signature = self
            .signing_key
            .sign_prehash(hash)
            .expect("32-byte prehash is always signable");
        signature.to_der().as_bytes().to_vec()
    }

    /// The clientDataJSON a browser would produce for `challenge`.
    pub fn client_data_for(&self, challenge: &Challenge) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": CLIENT_DATA_TYPE_GET,
            "challenge": URL_SAFE_NO_PAD.encode(challenge.as_bytes()),
            "origin": self.origin,
            "crossOrigin": false,
        }))
        .expect("json! value always serializes")
    }

    /// A user-present, user-verified assertion over `challenge`.
    pub fn assert(&self, challenge: &Challenge) -> Assertion {
        self.assert_with_flags(challenge, FLAG_USER_PRESENT | FLAG_USER_VERIFIED)
    }

    /// An assertion over `challenge` with arbitrary authenticator flags.
    pub fn assert_with_flags(&self, challenge: &Challenge, flags: u8) -> Assertion {
        let client_data = self.client_data_for(challenge);
        self.assert_with_client_data(client_data, flags)
    }

    /// Sign arbitrary clientData bytes. Used to craft assertions that are
    /// correctly signed but carry the wrong binding.
    pub fn assert_with_client_data(&self, client_data_json: Vec<u8>, flags: u8) -> Assertion {
        let authenticator_data = self.authenticator_data(flags);

        let mut signed = authenticator_data.clone();
        signed.extend_from_slice(&sha256(&client_data_json));
        // `Signer` hashes with SHA-256, exactly what the platform does.
        let signature: Signature = self.signing_key.sign(&signed);

        Assertion::new(
            authenticator_data,
            client_data_json,
            signature.to_der().as_bytes().to_vec(),
        )
    }

    /// `rpIdHash ‖ flags ‖ signCount`, advancing the counter.
    pub fn authenticator_data(&self, flags: u8) -> Vec<u8> {
        let count = self.sign_count.fetch_add(1, Ordering::SeqCst) + 1;
        let mut data = Vec::with_capacity(37);
        data.extend_from_slice(&sha256(self.rp_id.as_bytes()));
        data.push(flags);
        data.extend_from_slice(&count.to_be_bytes());
        data
    }
}

impl std::fmt::Debug for SoftAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftAuthenticator")
            .field("public_key", &self.public_key())
            .field("rp_id", &self.rp_id)
            .finish_non_exhaustive()
    }
}
