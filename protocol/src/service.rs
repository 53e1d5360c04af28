//! # Authorization Service
//!
//! Ledger + relay, glued together in the only order that is safe:
//!
//! ```text
//! request ──► AuthorizationLedger::authorize ──► AuthorizedOperation ──► RelayAdapter::submit
//!                 (nonce consumed here)                                  (may fail; nonce stays consumed)
//! ```
//!
//! A relay failure is reported in the [`SubmissionOutcome`], not as an
//! error: the authorization itself succeeded and is final.

use std::sync::Arc;

use serde::Serialize;

use crate::error::AuthError;
use crate::storage::DbError;
use crate::ledger::operation::{AuthorizationRequest, AuthorizedOperation};
use crate::ledger::AuthorizationLedger;
use crate::relay::{RelayAdapter, RelayReceipt};

/// What happened downstream of a successful authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Executed { receipt: RelayReceipt },
    Failed { error: String },
    /// Ledger-internal operation (key rotation); nothing to relay.
    NotRelayed,
}

impl ExecutionStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionOutcome {
    pub authorized: AuthorizedOperation,
    pub execution: ExecutionStatus,
    /// The nonce the next challenge for this identity will be bound to.
    pub next_nonce: u64,
}

#[derive(Clone)]
pub struct AuthorizationService {
    ledger: Arc<AuthorizationLedger>,
    relay: Arc<dyn RelayAdapter>,
}

impl AuthorizationService {
    pub fn new(ledger: Arc<AuthorizationLedger>, relay: Arc<dyn RelayAdapter>) -> Self {
        Self { ledger, relay }
    }

    pub fn ledger(&self) -> &Arc<AuthorizationLedger> {
        &self.ledger
    }

    /// Authorize, then execute. `Err` means *not authorized* and nothing
    /// changed; `Ok` means the nonce was consumed, whatever the relay did.
    ///
    /// The ledger step commits and flushes sled under the identity lock, so
    /// it runs on the blocking pool rather than a runtime worker.
    pub async fn submit(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<SubmissionOutcome, AuthError> {
        let ledger = Arc::clone(&self.ledger);
        let owned = request.clone();
        let authorized = tokio::task::spawn_blocking(move || ledger.authorize(&owned))
            .await
            .map_err(|e| DbError::Task(format!("spawn_blocking failed: {e}")))??;

        let execution = if authorized.operation().is_relayed() {
            match self.relay.submit(&authorized).await {
                Ok(receipt) => ExecutionStatus::Executed { receipt },
                Err(e) => {
                    tracing::warn!(
                        operation_id = %authorized.operation_id(),
                        identity = %authorized.identity(),
                        error = %e,
                        "relay failed; nonce stays consumed"
                    );
                    ExecutionStatus::Failed {
                        error: e.to_string(),
                    }
                }
            }
        } else {
            ExecutionStatus::NotRelayed
        };

        Ok(SubmissionOutcome {
            next_nonce: authorized.nonce() + 1,
            authorized,
            execution,
        })
    }
}

impl std::fmt::Debug for AuthorizationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationService")
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelyingPartyPolicy;
    use crate::ledger::{IdentityId, Operation};
    use crate::relay::{LocalExecutor, RelayError};
    use crate::testing::SoftAuthenticator;
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl RelayAdapter for Offline {
        async fn submit(&self, _op: &AuthorizedOperation) -> Result<RelayReceipt, RelayError> {
            Err(RelayError::Unavailable("connection refused".into()))
        }
    }

    fn id(s: &str) -> IdentityId {
        IdentityId::new(s).unwrap()
    }

    fn request(
        ledger: &AuthorizationLedger,
        auth: &SoftAuthenticator,
        operation: Operation,
    ) -> AuthorizationRequest {
        let (challenge, nonce) = ledger.challenge_for(&id("alice"), &operation).unwrap();
        AuthorizationRequest {
            identity: id("alice"),
            operation,
            assertion: auth.assert(&challenge),
            expected_nonce: Some(nonce),
        }
    }

    #[tokio::test]
    async fn authorized_transfer_executes() {
        let ledger = Arc::new(AuthorizationLedger::in_memory(RelyingPartyPolicy::default()).unwrap());
        let exec = LocalExecutor::new(ledger.db().clone());
        exec.deposit(&id("alice"), 500).unwrap();
        let service = AuthorizationService::new(ledger.clone(), Arc::new(exec.clone()));

        let auth = SoftAuthenticator::generate();
        ledger.register(id("alice"), auth.public_key()).unwrap();

        let op = Operation::Transfer {
            target: id("bob"),
            amount: 100,
        };
        let outcome = service.submit(&request(&ledger, &auth, op)).await.unwrap();
        assert!(matches!(outcome.execution, ExecutionStatus::Executed { .. }));
        assert_eq!(outcome.next_nonce, 1);
        assert_eq!(exec.balance_of(&id("bob")).unwrap(), 100);
    }

    #[tokio::test]
    async fn relay_failure_keeps_nonce_consumed() {
        let ledger = Arc::new(AuthorizationLedger::in_memory(RelyingPartyPolicy::default()).unwrap());
        let service = AuthorizationService::new(ledger.clone(), Arc::new(Offline));
        let auth = SoftAuthenticator::generate();
        ledger.register(id("alice"), auth.public_key()).unwrap();

        let req = request(
            &ledger,
            &auth,
            Operation::Transfer {
                target: id("bob"),
                amount: 1,
            },
        );
        let outcome = service.submit(&req).await.unwrap();
        assert!(outcome.execution.is_failure());
        assert_eq!(ledger.nonce(&id("alice")), Some(1));

        // And the same assertion is still dead.
        assert!(service.submit(&req).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_consume_once() {
        let ledger = Arc::new(AuthorizationLedger::in_memory(RelyingPartyPolicy::default()).unwrap());
        let exec = LocalExecutor::new(ledger.db().clone());
        exec.deposit(&id("alice"), 1_000).unwrap();
        let service = AuthorizationService::new(ledger.clone(), Arc::new(exec.clone()));
        let auth = SoftAuthenticator::generate();
        ledger.register(id("alice"), auth.public_key()).unwrap();

        let req = request(
            &ledger,
            &auth,
            Operation::Transfer {
                target: id("bob"),
                amount: 10,
            },
        );
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let req = req.clone();
                tokio::spawn(async move { service.submit(&req).await })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(ledger.nonce(&id("alice")), Some(1));
        assert_eq!(exec.balance_of(&id("bob")).unwrap(), 10);
    }

    #[tokio::test]
    async fn rotation_is_not_relayed() {
        let ledger = Arc::new(AuthorizationLedger::in_memory(RelyingPartyPolicy::default()).unwrap());
        let service = AuthorizationService::new(ledger.clone(), Arc::new(Offline));
        let auth = SoftAuthenticator::generate();
        ledger.register(id("alice"), auth.public_key()).unwrap();

        let op = Operation::RotateKey {
            new_key: SoftAuthenticator::generate().public_key(),
        };
        let outcome = service.submit(&request(&ledger, &auth, op)).await.unwrap();
        assert_eq!(outcome.execution, ExecutionStatus::NotRelayed);
    }
}
