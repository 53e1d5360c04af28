//! # Passkey Public Keys
//!
//! A registered passkey is a P-256 point, stored as two 32-byte big-endian
//! affine coordinates. We never see the private half. It lives in the
//! platform's secure element and that is exactly where it should stay.
//!
//! Construction always validates the point. A `PublicKey` you can hold is a
//! point on the curve; the all-zero sentinel and off-curve junk are rejected
//! at the door, not somewhere deep in the verification path.

use p256::ecdsa::VerifyingKey;
use p256::{EncodedPoint, FieldBytes};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::config::COORDINATE_LENGTH;
use crate::crypto::hash::blake3_hash;

/// Errors that can occur when building a public key.
///
/// Intentionally vague about *why* a point was rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid coordinate length: expected 32 bytes")]
    InvalidLength,

    #[error("invalid coordinate encoding: {0}")]
    InvalidEncoding(String),

    #[error("invalid public key: not a point on P-256")]
    NotOnCurve,
}

/// A P-256 public key in affine coordinates.
///
/// Serializes as a pair of hex coordinates. Deserialization goes through
/// [`PublicKey::from_hex`], so a decoded key is always on the curve, whether
/// it came off the wire or out of the database.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "KeyCoordinates", into = "KeyCoordinates")]
pub struct PublicKey {
    x: [u8; COORDINATE_LENGTH],
    y: [u8; COORDINATE_LENGTH],
}

impl PublicKey {
    /// Build a key from its affine coordinates, rejecting anything that is
    /// not a point on the curve (the `(0, 0)` sentinel included).
    pub fn from_coordinates(
        x: [u8; COORDINATE_LENGTH],
        y: [u8; COORDINATE_LENGTH],
    ) -> Result<Self, KeyError> {
        if !is_on_curve(&x, &y) {
            return Err(KeyError::NotOnCurve);
        }
        Ok(Self { x, y })
    }

    /// Build a key from two hex strings (with or without `0x`).
    pub fn from_hex(x_hex: &str, y_hex: &str) -> Result<Self, KeyError> {
        let x = decode_coordinate(x_hex)?;
        let y = decode_coordinate(y_hex)?;
        Self::from_coordinates(x, y)
    }

    /// The x coordinate, big-endian.
    pub fn x(&self) -> &[u8; COORDINATE_LENGTH] {
        &self.x
    }

    /// The y coordinate, big-endian.
    pub fn y(&self) -> &[u8; COORDINATE_LENGTH] {
        &self.y
    }

    /// Hex-encoded x coordinate.
    pub fn x_hex(&self) -> String {
        hex::encode(self.x)
    }

    /// Hex-encoded y coordinate.
    pub fn y_hex(&self) -> String {
        hex::encode(self.y)
    }

    /// SEC1 uncompressed encoding: `0x04 ‖ x ‖ y`.
    pub fn to_sec1_uncompressed(&self) -> [u8; 1 + 2 * COORDINATE_LENGTH] {
        let mut out = [0u8; 1 + 2 * COORDINATE_LENGTH];
        out[0] = 0x04;
        out[1..1 + COORDINATE_LENGTH].copy_from_slice(&self.x);
        out[1 + COORDINATE_LENGTH..].copy_from_slice(&self.y);
        out
    }

    /// Short, log-safe fingerprint: first 8 bytes of BLAKE3(x ‖ y), hex.
    pub fn fingerprint(&self) -> String {
        let mut preimage = [0u8; 2 * COORDINATE_LENGTH];
        preimage[..COORDINATE_LENGTH].copy_from_slice(&self.x);
        preimage[COORDINATE_LENGTH..].copy_from_slice(&self.y);
        hex::encode(&blake3_hash(&preimage)[..8])
    }
}

/// Wire form of a [`PublicKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCoordinates {
    pub x: String,
    pub y: String,
}

impl TryFrom<KeyCoordinates> for PublicKey {
    type Error = KeyError;

    fn try_from(value: KeyCoordinates) -> Result<Self, Self::Error> {
        Self::from_hex(&value.x, &value.y)
    }
}

impl From<PublicKey> for KeyCoordinates {
    fn from(key: PublicKey) -> Self {
        Self {
            x: key.x_hex(),
            y: key.y_hex(),
        }
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fingerprint())
    }
}

/// Whether `(x, y)` is a valid affine point on P-256.
///
/// The all-zero pair is the point-at-infinity sentinel and is never on the
/// curve; we short-circuit it so the check does not depend on the decoder.
pub fn is_on_curve(x: &[u8; COORDINATE_LENGTH], y: &[u8; COORDINATE_LENGTH]) -> bool {
    if x.iter().all(|b| *b == 0) && y.iter().all(|b| *b == 0) {
        return false;
    }
    let point =
        EncodedPoint::from_affine_coordinates(FieldBytes::from_slice(x), FieldBytes::from_slice(y), false);
    VerifyingKey::from_encoded_point(&point).is_ok()
}

fn decode_coordinate(s: &str) -> Result<[u8; COORDINATE_LENGTH], KeyError> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(trimmed).map_err(|e| KeyError::InvalidEncoding(e.to_string()))?;
    if bytes.len() != COORDINATE_LENGTH {
        return Err(KeyError::InvalidLength);
    }
    let mut out = [0u8; COORDINATE_LENGTH];
    out.copy_from_slice(&bytes);
    Ok(out)
}
