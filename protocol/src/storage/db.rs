//! # LedgerDb — Persistent Storage Engine
//!
//! The persistence layer for PASSGATE, built on sled's embedded key-value
//! store. All on-disk data flows through this module.
//!
//! ## Tree Layout
//!
//! | Tree              | Key                    | Value                      |
//! |-------------------|------------------------|----------------------------|
//! | `identities`      | identity (UTF-8)       | `bincode(IdentityRecord)`  |
//! | `used_signatures` | replay digest (32B)    | consuming nonce (8B BE)    |
//! | `balances`        | account (UTF-8)        | balance (8B BE)            |
//! | `calls`           | operation id (16B)     | `bincode(CallRecord)`      |
//! | `metadata`        | key (UTF-8)            | value (bytes)              |
//!
//! ## Atomicity
//!
//! Authorizing an operation writes the updated identity record (nonce + 1,
//! maybe a new key) and the replay digest in a single sled transaction over
//! both trees. Either the nonce moved *and* the signature is spent, or
//! neither happened. Same story for transfers: debit, credit and the call
//! log land together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionalTree, Transactional,
};
use sled::{Db, Tree};
use std::path::Path;
use uuid::Uuid;

use crate::ledger::identity::{IdentityId, IdentityRecord};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The blocking task running a commit was cancelled or panicked.
    #[error("ledger task failed: {0}")]
    Task(String),

    /// The replay digest is already in `used_signatures`.
    #[error("signature already consumed")]
    SignatureReplayed,

    #[error("insufficient balance in {account}: have {balance}, need {requested}")]
    InsufficientBalance {
        account: String,
        balance: u64,
        requested: u64,
    },

    #[error("balance overflow in {0}")]
    BalanceOverflow(String),

    /// The data directory was created for a different network.
    #[error("database belongs to network {stored}, refusing to open as {requested}")]
    NetworkMismatch { stored: String, requested: String },
}

pub type DbResult<T> = Result<T, DbError>;

fn from_transaction(err: TransactionError<DbError>) -> DbError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => DbError::Sled(e),
    }
}

fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode_u64(bytes: &[u8]) -> DbResult<u64> {
    let word: [u8; 8] = bytes
        .try_into()
        .map_err(|_| DbError::Serialization("invalid u64 bytes".to_string()))?;
    Ok(u64::from_be_bytes(word))
}

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

/// Well-known key in the `metadata` tree for the network name.
const META_NETWORK: &[u8] = b"network";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One executed `Call`, as logged by the local executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    pub operation_id: Uuid,
    pub caller: IdentityId,
    pub target: IdentityId,
    pub value: u64,
    /// BLAKE3 of the payload; the payload itself is not retained.
    pub payload_hash: [u8; 32],
    pub payload_len: usize,
    pub executed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// LedgerDb
// ---------------------------------------------------------------------------

/// Persistent storage for identities, replay records, balances and the
/// call log.
///
/// # Thread Safety
///
/// sled trees support lock-free concurrent reads and serialized writes, so
/// `LedgerDb` is shared as-is (it is `Clone`, handles are reference counted).
/// Per-identity ordering is the ledger's job, not this layer's.
#[derive(Debug, Clone)]
pub struct LedgerDb {
    db: Db,
    identities: Tree,
    used_signatures: Tree,
    balances: Tree,
    calls: Tree,
    metadata: Tree,
}

impl LedgerDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is cleaned up automatically when
    /// dropped. For tests.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let identities = db.open_tree("identities")?;
        let used_signatures = db.open_tree("used_signatures")?;
        let balances = db.open_tree("balances")?;
        let calls = db.open_tree("calls")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            identities,
            used_signatures,
            balances,
            calls,
            metadata,
        })
    }

    // -- Metadata -----------------------------------------------------------

    /// Stamp the database with a network name on first use, and refuse to
    /// reuse it for a different one afterwards.
    pub fn bind_network(&self, network: &str) -> DbResult<()> {
        match self.metadata.compare_and_swap(
            META_NETWORK,
            None as Option<&[u8]>,
            Some(network.as_bytes()),
        )? {
            Ok(()) => Ok(()),
            Err(cas) => {
                let stored = cas
                    .current
                    .map(|v| String::from_utf8_lossy(&v).into_owned())
                    .unwrap_or_default();
                if stored == network {
                    Ok(())
                } else {
                    Err(DbError::NetworkMismatch {
                        stored,
                        requested: network.to_string(),
                    })
                }
            }
        }
    }

    pub fn network(&self) -> DbResult<Option<String>> {
        Ok(self
            .metadata
            .get(META_NETWORK)?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    // -- Identities ---------------------------------------------------------

    pub fn get_identity(&self, id: &IdentityId) -> DbResult<Option<IdentityRecord>> {
        match self.identities.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Insert a record only if the identity is not present yet. Returns
    /// `false` (and writes nothing) if it already exists.
    pub fn insert_identity(&self, id: &IdentityId, record: &IdentityRecord) -> DbResult<bool> {
        let bytes = encode(record)?;
        let swapped = self
            .identities
            .compare_and_swap(id.as_bytes(), None as Option<&[u8]>, Some(bytes))?;
        Ok(swapped.is_ok())
    }

    /// Every registered identity. Used to warm the in-memory ledger.
    pub fn load_identities(&self) -> DbResult<Vec<(IdentityId, IdentityRecord)>> {
        let mut out = Vec::with_capacity(self.identities.len());
        for entry in self.identities.iter() {
            let (key, value) = entry?;
            let name = String::from_utf8(key.to_vec())
                .map_err(|e| DbError::Serialization(e.to_string()))?;
            let id = IdentityId::new(name).map_err(|e| DbError::Serialization(e.to_string()))?;
            out.push((id, decode(&value)?));
        }
        Ok(out)
    }

    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }

    // -- Authorization commit -----------------------------------------------

    /// Persist an accepted authorization: the updated record and the replay
    /// digest, atomically. Fails with [`DbError::SignatureReplayed`] (and
    /// writes nothing) if the digest was already consumed.
    pub fn commit_authorization(
        &self,
        id: &IdentityId,
        record: &IdentityRecord,
        replay_digest: &[u8; 32],
        consumed_nonce: u64,
    ) -> DbResult<()> {
        let record_bytes = encode(record)?;
        let nonce_bytes = consumed_nonce.to_be_bytes();

        (&self.identities, &self.used_signatures)
            .transaction(|(identities, used)| {
                if used.get(replay_digest)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(DbError::SignatureReplayed));
                }
                identities.insert(id.as_bytes(), record_bytes.as_slice())?;
                used.insert(&replay_digest[..], &nonce_bytes[..])?;
                Ok(())
            })
            .map_err(from_transaction)?;

        self.db.flush()?;
        Ok(())
    }

    pub fn is_signature_used(&self, replay_digest: &[u8; 32]) -> DbResult<bool> {
        Ok(self.used_signatures.contains_key(replay_digest)?)
    }

    pub fn used_signature_count(&self) -> usize {
        self.used_signatures.len()
    }

    // -- Balances -----------------------------------------------------------

    pub fn balance(&self, account: &IdentityId) -> DbResult<u64> {
        match self.balances.get(account.as_bytes())? {
            Some(bytes) => decode_u64(&bytes),
            None => Ok(0),
        }
    }

    /// Add `amount` to an account, returning the new balance.
    pub fn credit(&self, account: &IdentityId, amount: u64) -> DbResult<u64> {
        self.balances
            .transaction(|balances| {
                let current = read_balance(balances, account)?;
                let updated = current.checked_add(amount).ok_or_else(|| {
                    ConflictableTransactionError::Abort(DbError::BalanceOverflow(
                        account.to_string(),
                    ))
                })?;
                balances.insert(account.as_bytes(), &updated.to_be_bytes()[..])?;
                Ok(updated)
            })
            .map_err(from_transaction)
    }

    /// Move `amount` from one account to another, optionally logging a call,
    /// all in one transaction.
    pub fn transfer(
        &self,
        from: &IdentityId,
        to: &IdentityId,
        amount: u64,
        call: Option<&CallRecord>,
    ) -> DbResult<()> {
        let call_entry = match call {
            Some(record) => Some((*record.operation_id.as_bytes(), encode(record)?)),
            None => None,
        };

        (&self.balances, &self.calls)
            .transaction(|(balances, calls)| {
                if amount > 0 {
                    let source = read_balance(balances, from)?;
                    let remaining = source.checked_sub(amount).ok_or_else(|| {
                        ConflictableTransactionError::Abort(DbError::InsufficientBalance {
                            account: from.to_string(),
                            balance: source,
                            requested: amount,
                        })
                    })?;
                    balances.insert(from.as_bytes(), &remaining.to_be_bytes()[..])?;

                    let target = read_balance(balances, to)?;
                    let credited = target.checked_add(amount).ok_or_else(|| {
                        ConflictableTransactionError::Abort(DbError::BalanceOverflow(
                            to.to_string(),
                        ))
                    })?;
                    balances.insert(to.as_bytes(), &credited.to_be_bytes()[..])?;
                }
                if let Some((key, value)) = &call_entry {
                    calls.insert(&key[..], value.as_slice())?;
                }
                Ok(())
            })
            .map_err(from_transaction)
    }

    // -- Call log -----------------------------------------------------------

    pub fn get_call(&self, operation_id: &Uuid) -> DbResult<Option<CallRecord>> {
        match self.calls.get(operation_id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    // -- Utility ------------------------------------------------------------

    /// Block until all pending writes are durable.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn read_balance(
    tree: &TransactionalTree,
    account: &IdentityId,
) -> Result<u64, ConflictableTransactionError<DbError>> {
    match tree.get(account.as_bytes())? {
        Some(bytes) => decode_u64(&bytes).map_err(ConflictableTransactionError::Abort),
        None => Ok(0),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
