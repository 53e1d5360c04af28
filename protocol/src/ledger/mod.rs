//! # Authorization Ledger
//!
//! Holds every identity's registered passkey and nonce, and decides whether
//! an assertion authorizes an operation. It is the only place that
//! constructs an [`AuthorizedOperation`].
//!
//! ## State Machine
//!
//! ```text
//! Unregistered ──register──► Registered(key, nonce = 0)
//!                                 │
//!                      authorize ok: nonce += 1  (RotateKey also swaps key)
//!                      authorize err: nothing changes
//! ```
//!
//! There is no way back to `Unregistered`.
//!
//! ## Concurrency
//!
//! Identities live in a `DashMap<IdentityId, Arc<Mutex<IdentityRecord>>>`.
//! The whole "read nonce → derive challenge → verify → persist → bump"
//! sequence runs under that identity's mutex, so two submissions for the
//! same identity are strictly ordered and at most one of them can consume a
//! given nonce. Different identities never contend.
//!
//! ## Replay Defense
//!
//! Two independent layers:
//!
//! 1. The challenge is bound to the current nonce, so an assertion goes
//!    stale the moment it is used.
//! 2. BLAKE3(identity ‖ messageHash) is written to `used_signatures` in the
//!    same transaction as the nonce bump. Even if the nonce check were
//!    somehow bypassed, the second commit aborts.

pub mod identity;
pub mod operation;

pub use identity::{IdentityId, IdentityRecord};
pub use operation::{AuthorizationRequest, AuthorizedOperation, Operation, OperationKind};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

use crate::challenge::{Challenge, ChallengeBinder};
use crate::config::RelyingPartyPolicy;
use crate::crypto::hash::domain_separated_hash;
use crate::crypto::keys::PublicKey;
use crate::crypto::verifier::SignatureVerifier;
use crate::error::AuthError;
use crate::storage::db::{DbError, LedgerDb};
use crate::webauthn::cose::decode_public_key;

/// BLAKE3 derive-key context for replay digests.
const REPLAY_DIGEST_CONTEXT: &str = "passgate/v1 used-signature";

/// Replay-record key for a verified assertion.
pub fn replay_digest(identity: &IdentityId, message_hash: &[u8; 32]) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(4 + identity.as_bytes().len() + 32);
    preimage.extend_from_slice(&(identity.as_bytes().len() as u32).to_be_bytes());
    preimage.extend_from_slice(identity.as_bytes());
    preimage.extend_from_slice(message_hash);
    domain_separated_hash(REPLAY_DIGEST_CONTEXT, &preimage)
}

pub struct AuthorizationLedger {
    policy: RelyingPartyPolicy,
    binder: ChallengeBinder,
    verifier: SignatureVerifier,
    db: LedgerDb,
    identities: DashMap<IdentityId, Arc<Mutex<IdentityRecord>>>,
}

impl AuthorizationLedger {
    /// Open a ledger over `db`, loading every persisted identity.
    ///
    /// The database is stamped with the policy's network on first open and
    /// refuses to be reopened for another network.
    pub fn open(db: LedgerDb, policy: RelyingPartyPolicy) -> Result<Self, AuthError> {
        db.bind_network(&policy.network)?;

        let identities = DashMap::new();
        for (id, record) in db.load_identities()? {
            identities.insert(id, Arc::new(Mutex::new(record)));
        }
        tracing::info!(
            network = %policy.network,
            identities = identities.len(),
            "authorization ledger opened"
        );

        Ok(Self {
            binder: ChallengeBinder::for_policy(&policy),
            policy,
            verifier: SignatureVerifier::default(),
            db,
            identities,
        })
    }

    /// Ledger over a throwaway database.
    pub fn in_memory(policy: RelyingPartyPolicy) -> Result<Self, AuthError> {
        Self::open(LedgerDb::open_temporary()?, policy)
    }

    /// Swap the signature verifier (e.g. for an external precompile).
    pub fn with_verifier(mut self, verifier: SignatureVerifier) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn policy(&self) -> &RelyingPartyPolicy {
        &self.policy
    }

    pub fn binder(&self) -> &ChallengeBinder {
        &self.binder
    }

    pub fn db(&self) -> &LedgerDb {
        &self.db
    }

    // -- Registration -------------------------------------------------------

    /// `Unregistered → Registered` with nonce 0.
    pub fn register(
        &self,
        identity: IdentityId,
        public_key: PublicKey,
    ) -> Result<IdentityRecord, AuthError> {
        match self.identities.entry(identity.clone()) {
            Entry::Occupied(_) => Err(AuthError::AlreadyRegistered(identity.to_string())),
            Entry::Vacant(slot) => {
                let record = IdentityRecord::new(public_key);
                if !self.db.insert_identity(&identity, &record)? {
                    return Err(AuthError::AlreadyRegistered(identity.to_string()));
                }
                slot.insert(Arc::new(Mutex::new(record.clone())));
                tracing::info!(%identity, key = %public_key, "identity registered");
                Ok(record)
            }
        }
    }

    /// Register from raw key bytes: a COSE_Key map or a SEC1 point.
    pub fn register_encoded(
        &self,
        identity: IdentityId,
        key_bytes: &[u8],
    ) -> Result<IdentityRecord, AuthError> {
        let public_key = decode_public_key(key_bytes)?;
        self.register(identity, public_key)
    }

    // -- Queries ------------------------------------------------------------

    pub fn snapshot(&self, identity: &IdentityId) -> Option<IdentityRecord> {
        let slot = self.slot(identity)?;
        let record = slot.lock().clone();
        Some(record)
    }

    pub fn nonce(&self, identity: &IdentityId) -> Option<u64> {
        let slot = self.slot(identity)?;
        let nonce = slot.lock().nonce;
        Some(nonce)
    }

    pub fn is_registered(&self, identity: &IdentityId) -> bool {
        self.identities.contains_key(identity)
    }

    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }

    /// The challenge a client must sign to authorize `operation` right now,
    /// together with the nonce it is bound to.
    pub fn challenge_for(
        &self,
        identity: &IdentityId,
        operation: &Operation,
    ) -> Result<(Challenge, u64), AuthError> {
        operation.validate(identity)?;
        let nonce = self
            .nonce(identity)
            .ok_or_else(|| AuthError::IdentityNotRegistered(identity.to_string()))?;
        Ok((self.binder.bind(identity, operation, nonce), nonce))
    }

    // -- Authorization ------------------------------------------------------

    /// Run the full pipeline for one request. On success the nonce has been
    /// consumed (durably) and the returned descriptor may be relayed. On any
    /// failure nothing changed.
    pub fn authorize(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizedOperation, AuthError> {
        let started = Instant::now();
        let result = self.authorize_inner(request);
        match &result {
            Ok(authorized) => tracing::info!(
                identity = %request.identity,
                operation = %request.operation.kind(),
                nonce = authorized.nonce(),
                operation_id = %authorized.operation_id(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "operation authorized"
            ),
            Err(e) => tracing::warn!(
                identity = %request.identity,
                operation = %request.operation.kind(),
                reason = e.reason(),
                "authorization rejected"
            ),
        }
        result
    }

    fn authorize_inner(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizedOperation, AuthError> {
        let identity = &request.identity;
        request.operation.validate(identity)?;

        let slot = self
            .slot(identity)
            .ok_or_else(|| AuthError::IdentityNotRegistered(identity.to_string()))?;
        let mut record = slot.lock();

        let current = record.nonce;
        if let Some(provided) = request.expected_nonce {
            if provided != current {
                return Err(AuthError::NonceStale { current, provided });
            }
        }

        if let Operation::RotateKey { new_key } = &request.operation {
            if *new_key == record.public_key {
                return Err(AuthError::InvalidOperation(
                    "new key is the current key".into(),
                ));
            }
        }

        let challenge = self.binder.bind(identity, &request.operation, current);
        let verified = request.assertion.verify(
            &challenge,
            &record.public_key,
            &self.policy,
            &self.verifier,
        )?;
        tracing::debug!(%identity, nonce = current, "assertion verified");

        let mut next = record.clone();
        next.nonce = current
            .checked_add(1)
            .ok_or_else(|| AuthError::InvalidOperation("nonce exhausted".into()))?;
        if let Operation::RotateKey { new_key } = &request.operation {
            next.public_key = *new_key;
            next.key_rotations = next.key_rotations.saturating_add(1);
        }

        let digest = replay_digest(identity, &verified.message_hash);
        self.db
            .commit_authorization(identity, &next, &digest, current)
            .map_err(|e| match e {
                DbError::SignatureReplayed => AuthError::InvalidSignature,
                other => AuthError::Storage(other),
            })?;

        // Persisted; now make it visible.
        *record = next;

        Ok(AuthorizedOperation::new(
            identity.clone(),
            request.operation.clone(),
            current,
            challenge,
        ))
    }

    fn slot(&self, identity: &IdentityId) -> Option<Arc<Mutex<IdentityRecord>>> {
        // Clone the Arc out so the shard guard is released before locking.
        self.identities
            .get(identity)
            .map(|entry| Arc::clone(entry.value()))
    }
}

impl std::fmt::Debug for AuthorizationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationLedger")
            .field("network", &self.policy.network)
            .field("identities", &self.identities.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
