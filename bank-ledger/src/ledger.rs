//! Main ledger orchestration layer
//!
//! This module ties together storage, the reference generator, and the
//! single-writer actor into a high-level API. Mutations are routed through
//! the actor; reads go straight to storage, since the one-unit commit keeps
//! every read a consistent snapshot.
//!
//! # Example
//!
//! ```no_run
//! use bank_ledger::{AccountType, Config, Ledger, UserId};
//!
//! #[tokio::main]
//! async fn main() -> bank_ledger::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config)?;
//!
//!     let owner = UserId::generate();
//!     let account = ledger
//!         .open_account(owner, "Jane Doe".to_string(), AccountType::Checking, None)
//!         .await?;
//!     println!("opened {}", account.account_number);
//!
//!     ledger.shutdown().await?;
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    metrics::Metrics,
    reference::ReferenceGenerator,
    types::{
        Account, AccountId, AccountNumber, AccountType, Card, CardId, CardStatus, DepositRequest,
        InternalTransferRequest, IssueCardRequest, Transaction, TransactionId, TransferRequest,
        UserId, WithdrawalRequest,
    },
    Config, Error, Result, Storage,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Main ledger interface
pub struct Ledger {
    /// Actor handle for mutations
    handle: LedgerHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Metrics collector
    metrics: Metrics,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    ///
    /// Must be called from within a Tokio runtime; the mutation actor is
    /// spawned onto it.
    pub fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let references = ReferenceGenerator::new(&config.references);
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;

        let handle = spawn_ledger_actor(
            storage.clone(),
            references,
            config.cards.clone(),
            metrics.clone(),
        );

        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            data_dir = %config.data_dir.display(),
            "Ledger opened"
        );

        Ok(Self {
            handle,
            storage,
            metrics,
            config,
        })
    }

    // --- Mutations (serialized through the actor) ---

    /// Open an account for an owner
    pub async fn open_account(
        &self,
        owner: UserId,
        holder_name: String,
        account_type: AccountType,
        currency: Option<String>,
    ) -> Result<Account> {
        self.handle
            .open_account(owner, holder_name, account_type, currency)
            .await
    }

    /// Close an account (zero balance required)
    pub async fn close_account(&self, account_id: AccountId, caller: UserId) -> Result<Account> {
        self.handle.close_account(account_id, caller).await
    }

    /// Credit an account
    pub async fn deposit(&self, request: DepositRequest) -> Result<Transaction> {
        self.handle.deposit(request).await
    }

    /// Debit an account
    pub async fn withdraw(
        &self,
        request: WithdrawalRequest,
        caller: UserId,
    ) -> Result<Transaction> {
        self.handle.withdraw(request, caller).await
    }

    /// Transfer to another account by number; returns the sender's row
    pub async fn transfer(&self, request: TransferRequest, caller: UserId) -> Result<Transaction> {
        self.handle.transfer(request, caller).await
    }

    /// Transfer between two accounts of the same owner; returns the source row
    pub async fn internal_transfer(
        &self,
        request: InternalTransferRequest,
        caller: UserId,
    ) -> Result<Transaction> {
        self.handle.internal_transfer(request, caller).await
    }

    /// Issue a card against an account
    pub async fn issue_card(&self, request: IssueCardRequest, caller: UserId) -> Result<Card> {
        self.handle.issue_card(request, caller).await
    }

    /// Block a card
    pub async fn block_card(&self, card_id: CardId, caller: UserId) -> Result<Card> {
        self.handle.block_card(card_id, caller).await
    }

    /// Unblock a card
    pub async fn unblock_card(&self, card_id: CardId, caller: UserId) -> Result<Card> {
        self.handle.unblock_card(card_id, caller).await
    }

    /// Cancel a card
    pub async fn cancel_card(&self, card_id: CardId, caller: UserId) -> Result<Card> {
        self.handle.cancel_card(card_id, caller).await
    }

    /// Change a card's spending limit
    pub async fn update_spending_limit(
        &self,
        card_id: CardId,
        new_limit: Decimal,
        caller: UserId,
    ) -> Result<Card> {
        self.handle
            .update_spending_limit(card_id, new_limit, caller)
            .await
    }

    // --- Reads (direct from storage) ---

    /// Get account by id
    pub fn account(&self, account_id: AccountId) -> Result<Account> {
        self.storage.get_account(account_id)
    }

    /// Get account by number
    pub fn account_by_number(&self, number: &AccountNumber) -> Result<Account> {
        self.storage
            .find_account_by_number(number)?
            .ok_or_else(|| Error::NotFound(format!("account number {}", number)))
    }

    /// All accounts of an owner, open and closed
    pub fn accounts_for_owner(&self, owner: UserId) -> Result<Vec<Account>> {
        self.storage.accounts_for_owner(owner)
    }

    /// Sum of balances across an owner's open accounts
    pub fn total_balance(&self, owner: UserId) -> Result<Decimal> {
        let total = self
            .storage
            .accounts_for_owner(owner)?
            .iter()
            .filter(|a| a.is_active())
            .map(|a| a.balance)
            .sum();
        Ok(total)
    }

    /// Get transaction by id
    pub fn transaction(&self, transaction_id: TransactionId) -> Result<Transaction> {
        self.storage.get_transaction(transaction_id)
    }

    /// Get transaction by reference
    pub fn transaction_by_reference(&self, reference: &str) -> Result<Transaction> {
        self.storage
            .find_transaction_by_reference(reference)?
            .ok_or_else(|| Error::NotFound(format!("transaction reference {}", reference)))
    }

    /// Transaction history for an account, newest first
    pub fn transactions_for_account(&self, account_id: AccountId) -> Result<Vec<Transaction>> {
        self.storage.transactions_for_account(account_id)
    }

    /// Transaction history within a time range (inclusive), newest first
    pub fn transactions_for_account_between(
        &self,
        account_id: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        self.storage
            .transactions_for_account_between(account_id, from, to)
    }

    /// Get card by id
    pub fn card(&self, card_id: CardId) -> Result<Card> {
        self.storage.get_card(card_id)
    }

    /// All cards of an owner, any status
    pub fn cards_for_owner(&self, owner: UserId) -> Result<Vec<Card>> {
        self.storage.cards_for_owner(owner)
    }

    /// Active cards of an owner
    pub fn active_cards_for_owner(&self, owner: UserId) -> Result<Vec<Card>> {
        let cards = self
            .storage
            .cards_for_owner(owner)?
            .into_iter()
            .filter(|c| c.status == CardStatus::Active)
            .collect();
        Ok(cards)
    }

    /// All cards linked to an account
    pub fn cards_for_account(&self, account_id: AccountId) -> Result<Vec<Card>> {
        self.storage.cards_for_account(account_id)
    }

    /// Get metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Get configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}
