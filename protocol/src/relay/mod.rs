//! # Relay
//!
//! Once the ledger has authorized an operation, somebody has to actually
//! execute it. That somebody is a [`RelayAdapter`]: a chain submitter, a
//! queue, or, for a standalone node, the [`LocalExecutor`] that keeps
//! balances in the same sled database.
//!
//! The relay sees the [`AuthorizedOperation`] by shared reference and has no
//! way to build or modify one. It can only execute it or fail. A failure
//! does **not** give the nonce back; the signature was spent the moment the
//! ledger accepted it.

pub mod local;

pub use local::LocalExecutor;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::ledger::operation::{AuthorizedOperation, OperationKind};
use crate::storage::db::DbError;

/// Errors a relay can report. All of them are execution failures; none of
/// them un-authorize anything.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The executor looked at the operation and refused it (insufficient
    /// balance, unknown target, ...).
    #[error("execution rejected: {0}")]
    Rejected(String),

    /// The operation kind never leaves the ledger.
    #[error("{0} operations are not relayed")]
    NotRelayable(OperationKind),

    /// The downstream system could not be reached.
    #[error("relay unavailable: {0}")]
    Unavailable(String),

    #[error("relay storage error: {0}")]
    Storage(#[from] DbError),
}

/// Proof of execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelayReceipt {
    pub operation_id: Uuid,
    pub executed_at: DateTime<Utc>,
    pub detail: String,
}

/// Executes authorized operations.
#[async_trait]
pub trait RelayAdapter: Send + Sync {
    async fn submit(&self, operation: &AuthorizedOperation) -> Result<RelayReceipt, RelayError>;
}
