//! Bank Ledger
//!
//! Personal banking ledger core: accounts, immutable transaction history,
//! and cards with spending limits, backed by RocksDB.
//!
//! # Architecture
//!
//! - **Single Writer**: all mutations flow through one actor task
//! - **Atomic Units**: each operation commits as one RocksDB write batch
//! - **Append-only History**: transaction rows are never modified or deleted
//! - **Direct Reads**: queries bypass the actor and read storage snapshots
//!
//! # Invariants
//!
//! - Balances never go negative; overdrafts are rejected before commit
//! - Every balance change leaves exactly one transaction row per touched account
//! - Transfers conserve money: the debit and credit land in the same unit
//! - Card spend never exceeds the card's spending limit

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod accounts;
pub mod actor;
pub mod cards;
pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod reference;
pub mod storage;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use storage::{Storage, WriteUnit};
pub use types::{
    Account, AccountId, AccountNumber, AccountStatus, AccountType, Card, CardId, CardNumber,
    CardStatus, CardType, DepositRequest, InternalTransferRequest, IssueCardRequest, Transaction,
    TransactionId, TransactionKind, TransactionStatus, TransferRequest, UserId, WithdrawalRequest,
};
