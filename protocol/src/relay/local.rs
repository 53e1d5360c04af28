//! In-process executor over the ledger's sled database.

use async_trait::async_trait;
use chrono::Utc;

use super::{RelayAdapter, RelayError, RelayReceipt};
use crate::crypto::hash::blake3_hash;
use crate::ledger::identity::IdentityId;
use crate::ledger::operation::{AuthorizedOperation, Operation};
use crate::storage::db::{CallRecord, DbError, LedgerDb};

/// Executes transfers and calls against the `balances` and `calls` trees.
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    db: LedgerDb,
}

impl LocalExecutor {
    pub fn new(db: LedgerDb) -> Self {
        Self { db }
    }

    /// Mint into an account. Devnet faucet and test setup only.
    pub fn deposit(&self, account: &IdentityId, amount: u64) -> Result<u64, RelayError> {
        let balance = self.db.credit(account, amount)?;
        tracing::info!(%account, amount, balance, "deposit");
        Ok(balance)
    }

    pub fn balance_of(&self, account: &IdentityId) -> Result<u64, RelayError> {
        Ok(self.db.balance(account)?)
    }

    pub fn call_count(&self) -> usize {
        self.db.call_count()
    }

    fn execute(&self, authorized: &AuthorizedOperation) -> Result<String, RelayError> {
        let from = authorized.identity();
        match authorized.operation() {
            Operation::Transfer { target, amount } => {
                self.db
                    .transfer(from, target, *amount, None)
                    .map_err(rejection)?;
                Ok(format!("transferred {amount} from {from} to {target}"))
            }
            Operation::Call {
                target,
                value,
                payload,
            } => {
                let record = CallRecord {
                    operation_id: authorized.operation_id(),
                    caller: from.clone(),
                    target: target.clone(),
                    value: *value,
                    payload_hash: blake3_hash(payload),
                    payload_len: payload.len(),
                    executed_at: Utc::now(),
                };
                self.db
                    .transfer(from, target, *value, Some(&record))
                    .map_err(rejection)?;
                Ok(format!(
                    "called {target} with {} payload bytes and value {value}",
                    payload.len()
                ))
            }
            Operation::RotateKey { .. } => Err(RelayError::NotRelayable(
                authorized.operation().kind(),
            )),
        }
    }
}

fn rejection(err: DbError) -> RelayError {
    match err {
        DbError::InsufficientBalance { .. } | DbError::BalanceOverflow(_) => {
            RelayError::Rejected(err.to_string())
        }
        other => RelayError::Storage(other),
    }
}

#[async_trait]
impl RelayAdapter for LocalExecutor {
    async fn submit(&self, operation: &AuthorizedOperation) -> Result<RelayReceipt, RelayError> {
        let detail = self.execute(operation)?;
        tracing::debug!(operation_id = %operation.operation_id(), %detail, "executed locally");
        Ok(RelayReceipt {
            operation_id: operation.operation_id(),
            executed_at: Utc::now(),
            detail,
        })
    }
}
