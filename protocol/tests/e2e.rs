//! End-to-end integration tests for PASSGATE.
//!
//! These tests drive the public API the way a wallet backend would: register
//! a passkey, fetch the challenge for an operation, have a (software)
//! authenticator sign it, submit, and relay. They prove that challenge
//! binding, WebAuthn verification, the nonce state machine, replay tracking
//! and sled persistence compose correctly.
//!
//! Each test stands alone with its own temporary database.

use std::sync::Arc;

use async_trait::async_trait;

use passgate_protocol::config::{RelyingPartyPolicy, NETWORK_DEVNET, NETWORK_TESTNET};
use passgate_protocol::crypto::hash::sha256;
use passgate_protocol::relay::RelayError;
use passgate_protocol::storage::DbError;
use passgate_protocol::testing::{SoftAuthenticator, TEST_ORIGIN, TEST_RP_ID};
use passgate_protocol::{
    Assertion, AuthError, AuthorizationLedger, AuthorizationRequest, AuthorizationService,
    AuthorizedOperation, ExecutionStatus, IdentityId, LedgerDb, LocalExecutor, Operation,
    RelayAdapter, RelayReceipt,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn id(s: &str) -> IdentityId {
    IdentityId::new(s).expect("valid identity")
}

fn transfer(target: &str, amount: u64) -> Operation {
    Operation::Transfer {
        target: id(target),
        amount,
    }
}

/// A ledger on a temporary database with one registered identity.
fn setup(policy: RelyingPartyPolicy) -> (AuthorizationLedger, SoftAuthenticator) {
    let ledger = AuthorizationLedger::in_memory(policy).expect("ledger");
    let auth = SoftAuthenticator::generate();
    ledger
        .register(id("alice"), auth.public_key())
        .expect("register");
    (ledger, auth)
}

/// Fetches the current challenge for `operation` and signs it.
fn signed_request(
    ledger: &AuthorizationLedger,
    auth: &SoftAuthenticator,
    identity: &str,
    operation: Operation,
) -> AuthorizationRequest {
    let (challenge, nonce) = ledger
        .challenge_for(&id(identity), &operation)
        .expect("challenge");
    AuthorizationRequest {
        identity: id(identity),
        operation,
        assertion: auth.assert(&challenge),
        expected_nonce: Some(nonce),
    }
}

/// A relay that is always down.
struct Unreachable;

#[async_trait]
impl RelayAdapter for Unreachable {
    async fn submit(&self, _op: &AuthorizedOperation) -> Result<RelayReceipt, RelayError> {
        Err(RelayError::Unavailable("upstream timed out".into()))
    }
}

// ---------------------------------------------------------------------------
// 1. Authorize, Consume, Reject Replay
// ---------------------------------------------------------------------------

#[test]
fn transfer_lifecycle_consumes_nonce_once() {
    let (ledger, auth) = setup(RelyingPartyPolicy::default());
    assert_eq!(ledger.nonce(&id("alice")), Some(0));

    let request = signed_request(&ledger, &auth, "alice", transfer("treasury", 100));
    let authorized = ledger.authorize(&request).expect("authorized");

    assert_eq!(authorized.identity(), &id("alice"));
    assert_eq!(authorized.nonce(), 0);
    assert_eq!(authorized.operation(), &transfer("treasury", 100));
    assert_eq!(ledger.nonce(&id("alice")), Some(1));

    // Identical resubmission: nonce pinned to 0 is stale.
    let err = ledger.authorize(&request).unwrap_err();
    assert!(matches!(err, AuthError::NonceStale { current: 1, provided: 0 }));

    // Without the pin, the challenge is rebuilt at nonce 1 and no longer matches.
    let unpinned = AuthorizationRequest {
        expected_nonce: None,
        ..request
    };
    let err = ledger.authorize(&unpinned).unwrap_err();
    assert_eq!(err.reason(), "challenge_mismatch");
    assert_eq!(ledger.nonce(&id("alice")), Some(1));
}

#[test]
fn sequential_operations_each_need_a_fresh_assertion() {
    let (ledger, auth) = setup(RelyingPartyPolicy::default());

    for expected in 0..5u64 {
        let request = signed_request(&ledger, &auth, "alice", transfer("bob", 10 + expected));
        let authorized = ledger.authorize(&request).expect("authorized");
        assert_eq!(authorized.nonce(), expected);
    }
    assert_eq!(ledger.nonce(&id("alice")), Some(5));
    assert_eq!(ledger.db().used_signature_count(), 5);
}

#[test]
fn assertion_for_one_operation_does_not_authorize_another() {
    let (ledger, auth) = setup(RelyingPartyPolicy::default());
    let (challenge, _) = ledger
        .challenge_for(&id("alice"), &transfer("bob", 100))
        .unwrap();

    let tampered = AuthorizationRequest {
        identity: id("alice"),
        operation: transfer("mallory", 100),
        assertion: auth.assert(&challenge),
        expected_nonce: Some(0),
    };
    let err = ledger.authorize(&tampered).unwrap_err();
    assert!(matches!(err, AuthError::ChallengeMismatch));
    assert_eq!(ledger.nonce(&id("alice")), Some(0));
}

#[test]
fn another_identitys_key_cannot_sign() {
    let (ledger, alice) = setup(RelyingPartyPolicy::default());
    let bob = SoftAuthenticator::generate();
    ledger.register(id("bob"), bob.public_key()).unwrap();

    // Bob signs Alice's challenge.
    let (challenge, nonce) = ledger
        .challenge_for(&id("alice"), &transfer("bob", 5))
        .unwrap();
    let forged = AuthorizationRequest {
        identity: id("alice"),
        operation: transfer("bob", 5),
        assertion: bob.assert(&challenge),
        expected_nonce: Some(nonce),
    };
    let err = ledger.authorize(&forged).unwrap_err();
    assert!(matches!(err, AuthError::InvalidSignature));
    assert_eq!(err.public_class(), "invalid_signature");

    // Alice's own assertion still works afterwards.
    let request = signed_request(&ledger, &alice, "alice", transfer("bob", 5));
    assert!(ledger.authorize(&request).is_ok());
}

#[test]
fn cross_network_challenges_differ() {
    let devnet = AuthorizationLedger::in_memory(RelyingPartyPolicy::for_network(NETWORK_DEVNET))
        .unwrap();
    let testnet =
        AuthorizationLedger::in_memory(RelyingPartyPolicy::for_network(NETWORK_TESTNET)).unwrap();
    let auth = SoftAuthenticator::generate();
    devnet.register(id("alice"), auth.public_key()).unwrap();
    testnet.register(id("alice"), auth.public_key()).unwrap();

    // Signed for devnet, replayed on testnet at the same nonce.
    let request = signed_request(&devnet, &auth, "alice", transfer("bob", 1));
    let err = testnet.authorize(&request).unwrap_err();
    assert!(matches!(err, AuthError::ChallengeMismatch));
    assert!(devnet.authorize(&request).is_ok());
}

// ---------------------------------------------------------------------------
// 2. Relying Party Policy
// ---------------------------------------------------------------------------

#[test]
fn strict_policy_accepts_matching_authenticator() {
    let policy = RelyingPartyPolicy {
        rp_id: Some(TEST_RP_ID.to_string()),
        allowed_origins: vec![TEST_ORIGIN.to_string()],
        require_user_verification: true,
        ..RelyingPartyPolicy::default()
    };
    let (ledger, auth) = setup(policy);
    let request = signed_request(&ledger, &auth, "alice", transfer("bob", 1));
    assert!(ledger.authorize(&request).is_ok());
}

#[test]
fn strict_policy_rejects_foreign_relying_party() {
    let policy = RelyingPartyPolicy {
        rp_id: Some(TEST_RP_ID.to_string()),
        allowed_origins: vec![TEST_ORIGIN.to_string()],
        ..RelyingPartyPolicy::default()
    };
    let ledger = AuthorizationLedger::in_memory(policy).unwrap();
    let phisher = SoftAuthenticator::with_relying_party("evil.test", "https://evil.test");
    ledger.register(id("alice"), phisher.public_key()).unwrap();

    let request = signed_request(&ledger, &phisher, "alice", transfer("bob", 1));
    let err = ledger.authorize(&request).unwrap_err();
    assert!(matches!(err, AuthError::OriginMismatch(_)));
    assert_eq!(ledger.nonce(&id("alice")), Some(0));
}

#[test]
fn missing_user_presence_is_rejected() {
    let (ledger, auth) = setup(RelyingPartyPolicy::default());
    let (challenge, nonce) = ledger
        .challenge_for(&id("alice"), &transfer("bob", 1))
        .unwrap();
    let request = AuthorizationRequest {
        identity: id("alice"),
        operation: transfer("bob", 1),
        assertion: auth.assert_with_flags(&challenge, 0x00),
        expected_nonce: Some(nonce),
    };
    let err = ledger.authorize(&request).unwrap_err();
    assert!(matches!(err, AuthError::UserPresenceMissing));
}

#[test]
fn truncated_signature_is_rejected_without_state_change() {
    let (ledger, auth) = setup(RelyingPartyPolicy::default());
    let request = signed_request(&ledger, &auth, "alice", transfer("bob", 1));
    let sig = request.assertion.signature();
    let broken = AuthorizationRequest {
        assertion: Assertion::new(
            request.assertion.authenticator_data().to_vec(),
            request.assertion.client_data_json().to_vec(),
            sig[..sig.len() - 1].to_vec(),
        ),
        ..request.clone()
    };
    let err = ledger.authorize(&broken).unwrap_err();
    assert!(matches!(err, AuthError::MalformedSignature(_)));
    assert_eq!(ledger.nonce(&id("alice")), Some(0));

    // The untouched original still goes through.
    assert!(ledger.authorize(&request).is_ok());
}

// ---------------------------------------------------------------------------
// 3. Key Rotation
// ---------------------------------------------------------------------------

#[test]
fn rotation_retires_old_key() {
    let (ledger, old) = setup(RelyingPartyPolicy::default());
    let new = SoftAuthenticator::generate();

    let rotate = Operation::RotateKey {
        new_key: new.public_key(),
    };
    ledger
        .authorize(&signed_request(&ledger, &old, "alice", rotate))
        .expect("rotation authorized");

    let record = ledger.snapshot(&id("alice")).unwrap();
    assert_eq!(record.public_key, new.public_key());
    assert_eq!(record.key_rotations, 1);
    assert_eq!(record.nonce, 1);

    // Old key, current challenge: rejected.
    let err = ledger
        .authorize(&signed_request(&ledger, &old, "alice", transfer("bob", 1)))
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidSignature));

    // New key: accepted.
    assert!(ledger
        .authorize(&signed_request(&ledger, &new, "alice", transfer("bob", 1)))
        .is_ok());
}

// ---------------------------------------------------------------------------
// 4. Service + Relay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn service_executes_against_local_balances() {
    let (ledger, auth) = setup(RelyingPartyPolicy::default());
    let ledger = Arc::new(ledger);
    let executor = LocalExecutor::new(ledger.db().clone());
    executor.deposit(&id("alice"), 1_000).unwrap();
    let service = AuthorizationService::new(ledger.clone(), Arc::new(executor.clone()));

    let outcome = service
        .submit(&signed_request(&ledger, &auth, "alice", transfer("treasury", 100)))
        .await
        .unwrap();
    assert!(matches!(outcome.execution, ExecutionStatus::Executed { .. }));
    assert_eq!(outcome.next_nonce, 1);
    assert_eq!(executor.balance_of(&id("alice")).unwrap(), 900);
    assert_eq!(executor.balance_of(&id("treasury")).unwrap(), 100);

    let call = Operation::Call {
        target: id("vault"),
        value: 50,
        payload: b"deposit()".to_vec(),
    };
    let outcome = service
        .submit(&signed_request(&ledger, &auth, "alice", call))
        .await
        .unwrap();
    assert_eq!(outcome.next_nonce, 2);
    assert_eq!(executor.call_count(), 1);
    let record = ledger
        .db()
        .get_call(&outcome.authorized.operation_id())
        .unwrap()
        .expect("call recorded");
    assert_eq!(record.payload_len, 9);
    assert_eq!(executor.balance_of(&id("vault")).unwrap(), 50);
}

#[tokio::test]
async fn relay_failure_does_not_restore_nonce() {
    let (ledger, auth) = setup(RelyingPartyPolicy::default());
    let ledger = Arc::new(ledger);
    let service = AuthorizationService::new(ledger.clone(), Arc::new(Unreachable));

    let request = signed_request(&ledger, &auth, "alice", transfer("bob", 1));
    let outcome = service.submit(&request).await.unwrap();
    assert!(outcome.execution.is_failure());
    assert_eq!(ledger.nonce(&id("alice")), Some(1));

    // The spent assertion cannot be retried against the same relay.
    assert!(service.submit(&request).await.is_err());
}

#[tokio::test]
async fn overdraft_is_an_execution_failure_not_a_rejection() {
    let (ledger, auth) = setup(RelyingPartyPolicy::default());
    let ledger = Arc::new(ledger);
    let executor = LocalExecutor::new(ledger.db().clone());
    let service = AuthorizationService::new(ledger.clone(), Arc::new(executor.clone()));

    let outcome = service
        .submit(&signed_request(&ledger, &auth, "alice", transfer("bob", 10)))
        .await
        .unwrap();
    match outcome.execution {
        ExecutionStatus::Failed { error } => assert!(error.contains("rejected")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(ledger.nonce(&id("alice")), Some(1));
    assert_eq!(executor.balance_of(&id("bob")).unwrap(), 0);
}

// ---------------------------------------------------------------------------
// 5. Persistence
// ---------------------------------------------------------------------------

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let auth = SoftAuthenticator::generate();
    let request;

    {
        let db = LedgerDb::open(dir.path()).unwrap();
        let ledger = AuthorizationLedger::open(db, RelyingPartyPolicy::default()).unwrap();
        ledger.register(id("alice"), auth.public_key()).unwrap();
        request = signed_request(&ledger, &auth, "alice", transfer("bob", 7));
        ledger.authorize(&request).unwrap();
        ledger.db().flush().unwrap();
    }

    let db = LedgerDb::open(dir.path()).unwrap();
    let ledger = AuthorizationLedger::open(db, RelyingPartyPolicy::default()).unwrap();
    assert!(ledger.is_registered(&id("alice")));
    assert_eq!(ledger.nonce(&id("alice")), Some(1));
    assert_eq!(ledger.db().used_signature_count(), 1);

    // The consumed assertion is still dead after restart.
    let unpinned = AuthorizationRequest {
        expected_nonce: None,
        ..request
    };
    assert!(ledger.authorize(&unpinned).is_err());

    // And the next one lines up with the persisted nonce.
    let next = signed_request(&ledger, &auth, "alice", transfer("bob", 7));
    assert_eq!(ledger.authorize(&next).unwrap().nonce(), 1);
}

#[test]
fn reopening_under_another_network_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = LedgerDb::open(dir.path()).unwrap();
        AuthorizationLedger::open(db, RelyingPartyPolicy::for_network(NETWORK_DEVNET)).unwrap();
    }
    let db = LedgerDb::open(dir.path()).unwrap();
    let err = AuthorizationLedger::open(db, RelyingPartyPolicy::for_network(NETWORK_TESTNET))
        .unwrap_err();
    assert!(matches!(
        err,
        AuthError::Storage(DbError::NetworkMismatch { .. })
    ));
}

// ---------------------------------------------------------------------------
// 6. Registration Encodings
// ---------------------------------------------------------------------------

#[test]
fn register_from_cose_and_sec1() {
    let ledger = AuthorizationLedger::in_memory(RelyingPartyPolicy::default()).unwrap();
    let a = SoftAuthenticator::generate();
    let b = SoftAuthenticator::generate();

    ledger.register_encoded(id("cose"), &a.cose_key()).unwrap();
    ledger
        .register_encoded(id("sec1"), &b.public_key().to_sec1_uncompressed())
        .unwrap();

    assert_eq!(ledger.snapshot(&id("cose")).unwrap().public_key, a.public_key());
    assert_eq!(ledger.snapshot(&id("sec1")).unwrap().public_key, b.public_key());

    let err = ledger
        .register_encoded(id("junk"), &sha256(b"not a key"))
        .unwrap_err();
    assert!(matches!(err, AuthError::MalformedKey(_)));
    assert!(!ledger.is_registered(&id("junk")));

    let err = ledger.register_encoded(id("cose"), &b.cose_key()).unwrap_err();
    assert!(matches!(err, AuthError::AlreadyRegistered(_)));
}
