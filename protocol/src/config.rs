//! # Protocol Configuration & Constants
//!
//! Every magic number in PASSGATE lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! Two kinds of values live in this file:
//!
//! - **Wire constants** — lengths, tags, curve parameters. Changing any of
//!   these silently breaks every passkey already registered, so they only
//!   move together with [`CHALLENGE_ENCODING_VERSION`].
//! - **Runtime policy** — [`RelyingPartyPolicy`], which the node assembles
//!   from CLI flags and environment variables.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// The full version string of the authorization protocol.
pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Version byte prepended to every challenge preimage. Bump this (and the
/// context prefix) whenever the field order or field set of a challenge
/// changes. Old assertions must never verify under a new layout.
pub const CHALLENGE_ENCODING_VERSION: u8 = 1;

/// Prefix of the context identifier mixed into every challenge. The network
/// name is appended, so a devnet assertion can never be replayed on mainnet.
pub const CHALLENGE_CONTEXT_PREFIX: &str = "passgate/v1";

// ---------------------------------------------------------------------------
// Networks
// ---------------------------------------------------------------------------

/// Mainnet — the real deal. Mistakes here cost real money.
pub const NETWORK_MAINNET: &str = "mainnet";

/// Testnet — where we break things on purpose and call it "testing."
pub const NETWORK_TESTNET: &str = "testnet";

/// Devnet — the wild west. Faucet enabled, no promises.
pub const NETWORK_DEVNET: &str = "devnet";

// ---------------------------------------------------------------------------
// Curve Parameters (NIST P-256 / secp256r1)
// ---------------------------------------------------------------------------

/// Width of a P-256 field element / scalar in bytes.
pub const COORDINATE_LENGTH: usize = 32;

/// Length of a message hash handed to the verification primitive.
pub const MESSAGE_HASH_LENGTH: usize = 32;

/// Length of a challenge digest.
pub const CHALLENGE_LENGTH: usize = 32;

/// Order `n` of the P-256 base point, big-endian. Signature scalars must lie
/// in `[1, n - 1]`.
pub const P256_ORDER: [u8; COORDINATE_LENGTH] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xBC, 0xE6, 0xFA, 0xAD, 0xA7, 0x17, 0x9E, 0x84, 0xF3, 0xB9, 0xCA, 0xC2, 0xFC, 0x63, 0x25, 0x51,
];

/// Input length of the verification primitive: `hash ‖ r ‖ s ‖ x ‖ y`.
pub const PRIMITIVE_INPUT_LENGTH: usize = MESSAGE_HASH_LENGTH + 4 * COORDINATE_LENGTH;

/// Output width of the verification primitive on success.
pub const PRIMITIVE_OUTPUT_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// WebAuthn
// ---------------------------------------------------------------------------

/// `rpIdHash (32) ‖ flags (1) ‖ signCount (4)`: the fixed prefix of every
/// authenticatorData blob.
pub const AUTHENTICATOR_DATA_MIN_LENGTH: usize = 37;

/// User Present flag (bit 0).
pub const FLAG_USER_PRESENT: u8 = 0x01;

/// User Verified flag (bit 2). Set when the biometric actually ran.
pub const FLAG_USER_VERIFIED: u8 = 0x04;

/// The only clientData `type` an authorization assertion may carry.
pub const CLIENT_DATA_TYPE_GET: &str = "webauthn.get";

/// Hard cap on clientDataJSON size. Browsers produce a few hundred bytes.
pub const MAX_CLIENT_DATA_LENGTH: usize = 4 * 1024;

/// Hard cap on authenticatorData size (extensions included).
pub const MAX_AUTHENTICATOR_DATA_LENGTH: usize = 1024;

// ---------------------------------------------------------------------------
// Ledger Limits
// ---------------------------------------------------------------------------

/// Maximum identity / account name length in bytes.
pub const MAX_IDENTITY_LENGTH: usize = 64;

/// Maximum payload attached to a `Call` operation.
pub const MAX_CALL_PAYLOAD_BYTES: usize = 16 * 1024;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default HTTP API port.
pub const DEFAULT_RPC_PORT: u16 = 9841;

/// Default metrics (Prometheus) port.
pub const DEFAULT_METRICS_PORT: u16 = 9842;

// ---------------------------------------------------------------------------
// Runtime policy
// ---------------------------------------------------------------------------

/// Relying-party policy applied to every assertion.
///
/// `rp_id` and `allowed_origins` are optional hardening: when unset, the
/// authenticatorData rpIdHash and the clientData origin are not checked.
/// The challenge binding is always enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelyingPartyPolicy {
    /// Network name, folded into the challenge context identifier.
    pub network: String,
    /// WebAuthn relying party ID (e.g. `wallet.example.com`).
    pub rp_id: Option<String>,
    /// Exact origins accepted in clientData. Empty means "any".
    pub allowed_origins: Vec<String>,
    /// Require the UV flag in addition to UP.
    pub require_user_verification: bool,
}

impl RelyingPartyPolicy {
    /// A permissive policy for the given network: binding is enforced, origin
    /// and rpId are not.
    pub fn for_network(network: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            rp_id: None,
            allowed_origins: Vec::new(),
            require_user_verification: false,
        }
    }

    /// The versioned, network-scoped context identifier mixed into every
    /// challenge.
    pub fn context_identifier(&self) -> String {
        context_identifier(&self.network)
    }

    /// Whether `origin` passes the allow-list.
    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == origin)
    }
}

impl Default for RelyingPartyPolicy {
    fn default() -> Self {
        Self::for_network(NETWORK_DEVNET)
    }
}

/// Builds the context identifier for a network name.
pub fn context_identifier(network: &str) -> String {
    format!("{}/{}", CHALLENGE_CONTEXT_PREFIX, network)
}

/// Whether a network name is one we ship defaults for.
pub fn is_known_network(network: &str) -> bool {
    matches!(network, NETWORK_MAINNET | NETWORK_TESTNET | NETWORK_DEVNET)
}
