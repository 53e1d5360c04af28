// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # PASSGATE Protocol — Core Library
//!
//! Passkey-authorized ledger operations. A user holds a P-256 key inside a
//! secure element (phone, laptop, hardware key) and authorizes transfers,
//! calls and key rotations by producing WebAuthn assertions. The private
//! key never leaves the device; we only ever see signatures.
//!
//! The hard part is not verifying a signature. It's making sure the
//! signature is *for this operation, right now, exactly once*. That is the
//! Challenge-Bound Signature Authorization Protocol:
//!
//! 1. derive a challenge from `(network, identity, operation, nonce)`,
//! 2. decode the assertion (DER signature, authenticatorData, clientData),
//! 3. check clientData carries exactly that challenge,
//! 4. rebuild the signed message and verify it against the registered key,
//! 5. bump the nonce and record the signature, atomically.
//!
//! ## Architecture
//!
//! - **config** — Protocol constants and relying-party policy.
//! - **crypto** — Hashes, P-256 keys, the verification primitive and its
//!   range-checking front end.
//! - **challenge** — Deterministic challenge derivation.
//! - **webauthn** — Assertion decoding and the verification pipeline.
//! - **ledger** — Identities, nonces, and the authorization state machine.
//! - **storage** — sled persistence.
//! - **relay** — Execution of authorized operations.
//! - **service** — Ledger + relay in one call.
//!
//! ## Design Philosophy
//!
//! 1. Fail closed. Every stage either proves its part or rejects.
//! 2. The public key comes from the ledger, never from the request.
//! 3. Nonces only go up. A spent signature stays spent.
//! 4. If it touches authorization, it has tests. Plural.

pub mod challenge;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod relay;
pub mod service;
pub mod storage;
pub mod webauthn;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use challenge::{Challenge, ChallengeBinder};
pub use config::RelyingPartyPolicy;
pub use error::AuthError;
pub use ledger::{
    AuthorizationLedger, AuthorizationRequest, AuthorizedOperation, IdentityId, IdentityRecord,
    Operation,
};
pub use relay::{LocalExecutor, RelayAdapter, RelayError, RelayReceipt};
pub use service::{AuthorizationService, ExecutionStatus, SubmissionOutcome};
pub use storage::LedgerDb;
pub use webauthn::Assertion;
