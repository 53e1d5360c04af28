//! # Cryptographic Primitives for PASSGATE
//!
//! Everything that touches a curve or a hash function lives here. The
//! passkey side of the house is fixed by the platform, so the choices are
//! not ours to make:
//!
//! - **P-256 / ES256** for signatures. That is what secure enclaves and
//!   TPMs ship, and what WebAuthn assertions carry.
//! - **SHA-256** for the signed message, because the authenticator uses it.
//! - **BLAKE3** for our own digests (challenges, replay records), because
//!   nobody outside PASSGATE ever recomputes them.
//!
//! ## A note on "rolling your own crypto"
//!
//! We don't. The curve arithmetic is the `p256` crate. What we *do* own is
//! the boring part around it: range checks before the primitive runs, and
//! reading its answer strictly. That is [`verifier`].

pub mod hash;
pub mod keys;
pub mod primitive;
pub mod verifier;

pub use hash::{blake3_hash, domain_separated_hash, sha256, sha256_multi};
pub use keys::{is_on_curve, KeyCoordinates, KeyError, PublicKey};
pub use primitive::{CurveVerificationPrimitive, P256Precompile, PrimitiveError};
pub use verifier::{scalar_in_range, SignatureVerifier, Verdict};
