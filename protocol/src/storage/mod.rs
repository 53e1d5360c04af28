//! # Storage Module
//!
//! Persistence for PASSGATE. One sled database, five trees, bincode values.
//! The in-memory ledger is a cache in front of this: every accepted
//! authorization lands here first and only then becomes visible in memory,
//! so a crash can lose a response but never un-spend a signature.
//!
//! ## Design Decisions
//!
//! 1. **sled transactions for anything that must move together.** Nonce and
//!    replay digest; debit, credit and call log.
//!
//! 2. **Bincode for on-disk serialization.** Compact, fast, deterministic.
//!    JSON is for APIs and debugging; bincode is for storage.
//!
//! 3. **Big-endian integers as raw values.** Balances and nonces are 8-byte
//!    BE words so they read back without a decoder.

pub mod db;

pub use db::{CallRecord, DbError, DbResult, LedgerDb};
