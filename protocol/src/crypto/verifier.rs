//! # Signature Verification
//!
//! [`SignatureVerifier`] sits between the authorization pipeline and the raw
//! [`CurveVerificationPrimitive`]. It does two things the primitive cannot
//! be trusted to do:
//!
//! 1. **Range checks first.** `r` and `s` must be in `[1, n - 1]` and the
//!    public key must be a real point on P-256. Some primitives skip these
//!    checks and behave like an oracle on malformed input, so they run
//!    before the primitive is ever called.
//! 2. **Strict interpretation of the answer.** Only the 32-byte word `1`
//!    means "valid". An empty answer, any other word, or an error from the
//!    primitive all mean "invalid". There is no third state.
//!
//! The outcome is a plain `bool`. [`SignatureVerifier::evaluate`] exposes a
//! [`Verdict`] for logs and tests; nothing on the authorization path
//! branches on anything but `Verdict::Valid`.

use std::fmt;
use std::sync::Arc;

use crate::config::{COORDINATE_LENGTH, P256_ORDER};
use crate::crypto::keys::is_on_curve;
use crate::crypto::primitive::{
    encode_input, success_word, CurveVerificationPrimitive, P256Precompile,
};

/// Why a verification came out the way it did. Diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    /// `r` or `s` is zero or not below the curve order.
    ScalarOutOfRange,
    /// `(x, y)` is the zero sentinel or not on the curve.
    InvalidPoint,
    /// The primitive ran and said no (or said something non-canonical).
    PrimitiveRejected,
    /// The primitive could not be run at all.
    PrimitiveUnavailable,
}

impl Verdict {
    pub fn is_valid(self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::ScalarOutOfRange => write!(f, "scalar_out_of_range"),
            Self::InvalidPoint => write!(f, "invalid_point"),
            Self::PrimitiveRejected => write!(f, "primitive_rejected"),
            Self::PrimitiveUnavailable => write!(f, "primitive_unavailable"),
        }
    }
}

/// Range-checking front end for a curve verification primitive.
///
/// Cheap to clone: the primitive sits behind an `Arc`.
#[derive(Clone)]
pub struct SignatureVerifier {
    primitive: Arc<dyn CurveVerificationPrimitive>,
}

impl SignatureVerifier {
    /// Wrap an arbitrary primitive (a precompile client, a mock, …).
    pub fn new(primitive: Arc<dyn CurveVerificationPrimitive>) -> Self {
        Self { primitive }
    }

    /// `verify(messageHash, r, s, x, y) -> bool`.
    pub fn verify(
        &self,
        message_hash: &[u8; 32],
        r: &[u8; COORDINATE_LENGTH],
        s: &[u8; COORDINATE_LENGTH],
        x: &[u8; COORDINATE_LENGTH],
        y: &[u8; COORDINATE_LENGTH],
    ) -> bool {
        self.evaluate(message_hash, r, s, x, y).is_valid()
    }

    /// Same as [`verify`](Self::verify) but reports which gate decided.
    pub fn evaluate(
        &self,
        message_hash: &[u8; 32],
        r: &[u8; COORDINATE_LENGTH],
        s: &[u8; COORDINATE_LENGTH],
        x: &[u8; COORDINATE_LENGTH],
        y: &[u8; COORDINATE_LENGTH],
    ) -> Verdict {
        // Cheapest checks first; the primitive is never reached on bad ranges.
        if !scalar_in_range(r) || !scalar_in_range(s) {
            return Verdict::ScalarOutOfRange;
        }
        if !is_on_curve(x, y) {
            return Verdict::InvalidPoint;
        }

        let input = encode_input(message_hash, r, s, x, y);
        match self.primitive.call(&input) {
            Ok(output) if output.as_slice() == success_word().as_slice() => Verdict::Valid,
            Ok(_) => Verdict::PrimitiveRejected,
            Err(e) => {
                tracing::warn!(error = %e, "verification primitive call failed");
                Verdict::PrimitiveUnavailable
            }
        }
    }
}

impl Default for SignatureVerifier {
    fn default() -> Self {
        Self::new(Arc::new(P256Precompile))
    }
}

impl fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

/// `0 < scalar < n`, comparing big-endian byte arrays.
pub fn scalar_in_range(scalar: &[u8; COORDINATE_LENGTH]) -> bool {
    scalar.iter().any(|b| *b != 0) && *scalar < P256_ORDER
}
