//! # Curve Verification Primitive
//!
//! The raw `verifyCurveSignature` routine, modelled on the secp256r1
//! precompile interface used by EVM chains:
//!
//! ```text
//! input  = messageHash (32) ‖ r (32) ‖ s (32) ‖ x (32) ‖ y (32)   // 160 bytes
//! output = 0x00…01 (32 bytes) on success, empty on failure
//! ```
//!
//! The primitive is a collaborator: on a real chain it is a precompile call
//! that can fail or be unavailable. Callers must never read anything into
//! the output other than "is it exactly the success word". That
//! interpretation lives in [`super::verifier`], not here.

use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::EncodedPoint;
use thiserror::Error;

use crate::config::{MESSAGE_HASH_LENGTH, PRIMITIVE_INPUT_LENGTH, PRIMITIVE_OUTPUT_LENGTH};

/// Failure to *run* the primitive, as opposed to a negative answer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    #[error("invalid primitive input length: expected {expected}, got {actual}")]
    InvalidInputLength { expected: usize, actual: usize },

    #[error("verification primitive unavailable: {0}")]
    Unavailable(String),
}

/// A routine that checks a curve signature over a pre-hashed message.
///
/// Implementations return the canonical success word on success and any
/// other byte string (conventionally empty) on failure.
pub trait CurveVerificationPrimitive: Send + Sync {
    fn call(&self, input: &[u8]) -> Result<Vec<u8>, PrimitiveError>;
}

/// The 32-byte big-endian integer 1.
pub fn success_word() -> [u8; PRIMITIVE_OUTPUT_LENGTH] {
    let mut word = [0u8; PRIMITIVE_OUTPUT_LENGTH];
    word[PRIMITIVE_OUTPUT_LENGTH - 1] = 1;
    word
}

/// Assemble the 160-byte primitive input.
pub fn encode_input(
    message_hash: &[u8; 32],
    r: &[u8; 32],
    s: &[u8; 32],
    x: &[u8; 32],
    y: &[u8; 32],
) -> [u8; PRIMITIVE_INPUT_LENGTH] {
    let mut input = [0u8; PRIMITIVE_INPUT_LENGTH];
    input[..32].copy_from_slice(message_hash);
    input[32..64].copy_from_slice(r);
    input[64..96].copy_from_slice(s);
    input[96..128].copy_from_slice(x);
    input[128..160].copy_from_slice(y);
    input
}

/// In-process P-256 verification backed by the `p256` crate.
///
/// Behaves like the precompile: malformed points and signatures produce an
/// empty output, never an error. Only a wrong-length input is an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct P256Precompile;

impl CurveVerificationPrimitive for P256Precompile {
    fn call(&self, input: &[u8]) -> Result<Vec<u8>, PrimitiveError> {
        if input.len() != PRIMITIVE_INPUT_LENGTH {
            return Err(PrimitiveError::InvalidInputLength {
                expected: PRIMITIVE_INPUT_LENGTH,
                actual: input.len(),
            });
        }

        let (message_hash, rest) = input.split_at(MESSAGE_HASH_LENGTH);
        let (signature_bytes, public_key) = rest.split_at(64);

        match verify_prehashed(message_hash, signature_bytes, public_key) {
            Some(()) => Ok(success_word().to_vec()),
            None => Ok(Vec::new()),
        }
    }
}

fn verify_prehashed(message_hash: &[u8], signature: &[u8], public_key: &[u8]) -> Option<()> {
    // Fails for zero scalars as well as wrong lengths.
    let signature = Signature::from_slice(signature).ok()?;
    let public_key: &[u8; 64] = public_key.try_into().ok()?;
    let encoded_point = EncodedPoint::from_untagged_bytes(public_key.into());
    let verifying_key = VerifyingKey::from_encoded_point(&encoded_point).ok()?;
    verifying_key.verify_prehash(message_hash, &signature).ok()
}
