//! Actor-based concurrency for the ledger
//!
//! All mutations flow through a single actor task, so every operation sees
//! the storage state left by the previous one. Combined with the one-unit
//! commit in [`crate::storage`], this gives read-validate-write atomicity
//! without locks: two concurrent withdrawals that together overdraw an
//! account are processed in sequence, and the second fails validation.
//!
//! Reads do not go through the actor; [`crate::ledger::Ledger`] serves them
//! straight from storage.

use crate::{
    accounts, cards,
    config::CardConfig,
    engine,
    error::{Error, Result},
    metrics::Metrics,
    reference::ReferenceGenerator,
    storage::Storage,
    types::{
        Account, AccountId, AccountType, Card, CardId, DepositRequest, InternalTransferRequest,
        IssueCardRequest, Transaction, TransferRequest, UserId, WithdrawalRequest,
    },
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Open an account
    OpenAccount {
        owner: UserId,
        holder_name: String,
        account_type: AccountType,
        currency: Option<String>,
        response: oneshot::Sender<Result<Account>>,
    },

    /// Close an account
    CloseAccount {
        account_id: AccountId,
        caller: UserId,
        response: oneshot::Sender<Result<Account>>,
    },

    /// Credit an account
    Deposit {
        request: DepositRequest,
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Debit an account
    Withdraw {
        request: WithdrawalRequest,
        caller: UserId,
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Transfer to another account by number
    Transfer {
        request: TransferRequest,
        caller: UserId,
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Transfer between two accounts of the same owner
    InternalTransfer {
        request: InternalTransferRequest,
        caller: UserId,
        response: oneshot::Sender<Result<Transaction>>,
    },

    /// Issue a card
    IssueCard {
        request: IssueCardRequest,
        caller: UserId,
        response: oneshot::Sender<Result<Card>>,
    },

    /// Block a card
    BlockCard {
        card_id: CardId,
        caller: UserId,
        response: oneshot::Sender<Result<Card>>,
    },

    /// Unblock a card
    UnblockCard {
        card_id: CardId,
        caller: UserId,
        response: oneshot::Sender<Result<Card>>,
    },

    /// Cancel a card
    CancelCard {
        card_id: CardId,
        caller: UserId,
        response: oneshot::Sender<Result<Card>>,
    },

    /// Change a card's spending limit
    UpdateSpendingLimit {
        card_id: CardId,
        new_limit: Decimal,
        caller: UserId,
        response: oneshot::Sender<Result<Card>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes ledger mutations in sequence
pub struct LedgerActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Reference generator
    references: ReferenceGenerator,

    /// Card issuance configuration
    cards: CardConfig,

    /// Metrics collector
    metrics: Metrics,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        references: ReferenceGenerator,
        cards: CardConfig,
        metrics: Metrics,
        mailbox: mpsc::Receiver<LedgerMessage>,
    ) -> Self {
        Self {
            storage,
            references,
            cards,
            metrics,
            mailbox,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if matches!(msg, LedgerMessage::Shutdown) {
                break;
            }

            let started = Instant::now();
            self.handle_message(msg);
            self.metrics
                .record_operation_duration(started.elapsed().as_secs_f64());
        }

        tracing::debug!("Ledger actor stopped");
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::OpenAccount {
                owner,
                holder_name,
                account_type,
                currency,
                response,
            } => {
                let result = accounts::open_account(
                    &self.storage,
                    &self.references,
                    owner,
                    holder_name,
                    account_type,
                    currency,
                );
                self.observe(&result, &self.metrics.accounts_opened_total);
                let _ = response.send(result);
            }

            LedgerMessage::CloseAccount {
                account_id,
                caller,
                response,
            } => {
                let result = accounts::close_account(&self.storage, account_id, caller);
                self.observe(&result, &self.metrics.accounts_closed_total);
                let _ = response.send(result);
            }

            LedgerMessage::Deposit { request, response } => {
                let result = engine::deposit(&self.storage, &self.references, &request);
                self.observe(&result, &self.metrics.deposits_total);
                let _ = response.send(result);
            }

            LedgerMessage::Withdraw {
                request,
                caller,
                response,
            } => {
                let result = engine::withdraw(&self.storage, &self.references, &request, caller);
                self.observe(&result, &self.metrics.withdrawals_total);
                let _ = response.send(result);
            }

            LedgerMessage::Transfer {
                request,
                caller,
                response,
            } => {
                let result = engine::transfer(&self.storage, &self.references, &request, caller);
                self.observe(&result, &self.metrics.transfers_total);
                let _ = response.send(result);
            }

            LedgerMessage::InternalTransfer {
                request,
                caller,
                response,
            } => {
                let result =
                    engine::internal_transfer(&self.storage, &self.references, &request, caller);
                self.observe(&result, &self.metrics.internal_transfers_total);
                let _ = response.send(result);
            }

            LedgerMessage::IssueCard {
                request,
                caller,
                response,
            } => {
                let result = cards::issue_card(
                    &self.storage,
                    &self.references,
                    &self.cards,
                    &request,
                    caller,
                );
                self.observe(&result, &self.metrics.cards_issued_total);
                let _ = response.send(result);
            }

            LedgerMessage::BlockCard {
                card_id,
                caller,
                response,
            } => {
                let result = cards::block_card(&self.storage, card_id, caller);
                if let Err(e) = &result {
                    self.note_rejection(e);
                }
                let _ = response.send(result);
            }

            LedgerMessage::UnblockCard {
                card_id,
                caller,
                response,
            } => {
                let result = cards::unblock_card(&self.storage, card_id, caller);
                if let Err(e) = &result {
                    self.note_rejection(e);
                }
                let _ = response.send(result);
            }

            LedgerMessage::CancelCard {
                card_id,
                caller,
                response,
            } => {
                let result = cards::cancel_card(&self.storage, card_id, caller);
                if let Err(e) = &result {
                    self.note_rejection(e);
                }
                let _ = response.send(result);
            }

            LedgerMessage::UpdateSpendingLimit {
                card_id,
                new_limit,
                caller,
                response,
            } => {
                let result = cards::update_spending_limit(&self.storage, card_id, new_limit, caller);
                if let Err(e) = &result {
                    self.note_rejection(e);
                }
                let _ = response.send(result);
            }

            LedgerMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    fn observe<T>(&self, result: &Result<T>, counter: &prometheus::IntCounter) {
        match result {
            Ok(_) => counter.inc(),
            Err(e) => self.note_rejection(e),
        }
    }

    /// Validation rejections are counted; internal failures are not
    fn note_rejection(&self, error: &Error) {
        if error.is_rejection() {
            self.metrics.record_rejection();
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    /// Open an account
    pub async fn open_account(
        &self,
        owner: UserId,
        holder_name: String,
        account_type: AccountType,
        currency: Option<String>,
    ) -> Result<Account> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerMessage::OpenAccount {
            owner,
            holder_name,
            account_type,
            currency,
            response: tx,
        })
        .await?;
        Self::recv(rx).await
    }

    /// Close an account
    pub async fn close_account(&self, account_id: AccountId, caller: UserId) -> Result<Account> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerMessage::CloseAccount {
            account_id,
            caller,
            response: tx,
        })
        .await?;
        Self::recv(rx).await
    }

    /// Credit an account
    pub async fn deposit(&self, request: DepositRequest) -> Result<Transaction> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerMessage::Deposit {
            request,
            response: tx,
        })
        .await?;
        Self::recv(rx).await
    }

    /// Debit an account
    pub async fn withdraw(&self, request: WithdrawalRequest, caller: UserId) -> Result<Transaction> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerMessage::Withdraw {
            request,
            caller,
            response: tx,
        })
        .await?;
        Self::recv(rx).await
    }

    /// Transfer to another account by number
    pub async fn transfer(&self, request: TransferRequest, caller: UserId) -> Result<Transaction> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerMessage::Transfer {
            request,
            caller,
            response: tx,
        })
        .await?;
        Self::recv(rx).await
    }

    /// Transfer between two accounts of the same owner
    pub async fn internal_transfer(
        &self,
        request: InternalTransferRequest,
        caller: UserId,
    ) -> Result<Transaction> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerMessage::InternalTransfer {
            request,
            caller,
            response: tx,
        })
        .await?;
        Self::recv(rx).await
    }

    /// Issue a card
    pub async fn issue_card(&self, request: IssueCardRequest, caller: UserId) -> Result<Card> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerMessage::IssueCard {
            request,
            caller,
            response: tx,
        })
        .await?;
        Self::recv(rx).await
    }

    /// Block a card
    pub async fn block_card(&self, card_id: CardId, caller: UserId) -> Result<Card> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerMessage::BlockCard {
            card_id,
            caller,
            response: tx,
        })
        .await?;
        Self::recv(rx).await
    }

    /// Unblock a card
    pub async fn unblock_card(&self, card_id: CardId, caller: UserId) -> Result<Card> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerMessage::UnblockCard {
            card_id,
            caller,
            response: tx,
        })
        .await?;
        Self::recv(rx).await
    }

    /// Cancel a card
    pub async fn cancel_card(&self, card_id: CardId, caller: UserId) -> Result<Card> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerMessage::CancelCard {
            card_id,
            caller,
            response: tx,
        })
        .await?;
        Self::recv(rx).await
    }

    /// Change a card's spending limit
    pub async fn update_spending_limit(
        &self,
        card_id: CardId,
        new_limit: Decimal,
        caller: UserId,
    ) -> Result<Card> {
        let (tx, rx) = oneshot::channel();
        self.send(LedgerMessage::UpdateSpendingLimit {
            card_id,
            new_limit,
            caller,
            response: tx,
        })
        .await?;
        Self::recv(rx).await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.send(LedgerMessage::Shutdown).await
    }

    async fn send(&self, msg: LedgerMessage) -> Result<()> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))
    }

    async fn recv<T>(rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    storage: Arc<Storage>,
    references: ReferenceGenerator,
    cards: CardConfig,
    metrics: Metrics,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(1000); // Bounded channel for backpressure
    let actor = LedgerActor::new(storage, references, cards, metrics, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    fn test_handle() -> (LedgerHandle, Metrics, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let storage = Arc::new(Storage::open(&config).unwrap());
        let references = ReferenceGenerator::new(&config.references);
        let metrics = Metrics::new().unwrap();
        let handle = spawn_ledger_actor(storage, references, config.cards, metrics.clone());
        (handle, metrics, temp_dir)
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (handle, _metrics, _temp) = test_handle();
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_open_and_deposit() {
        let (handle, metrics, _temp) = test_handle();
        let owner = UserId::generate();

        let account = handle
            .open_account(owner, "Katherine Johnson".to_string(), AccountType::Checking, None)
            .await
            .unwrap();

        let transaction = handle
            .deposit(DepositRequest {
                account_id: account.id,
                amount: Decimal::new(5000, 2),
                description: None,
                method: None,
            })
            .await
            .unwrap();
        assert_eq!(transaction.balance_after, Decimal::new(5000, 2));

        assert_eq!(metrics.accounts_opened_total.get(), 1);
        assert_eq!(metrics.deposits_total.get(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_rejection_counted() {
        let (handle, metrics, _temp) = test_handle();
        let owner = UserId::generate();

        let account = handle
            .open_account(owner, "Katherine Johnson".to_string(), AccountType::Checking, None)
            .await
            .unwrap();

        let result = handle
            .withdraw(
                WithdrawalRequest {
                    account_id: account.id,
                    amount: Decimal::new(100, 2),
                    description: None,
                    method: None,
                    card_id: None,
                },
                owner,
            )
            .await;
        assert!(matches!(result, Err(Error::InsufficientFunds(_))));

        assert_eq!(metrics.withdrawals_total.get(), 0);
        assert_eq!(metrics.rejected_operations_total.get(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_clones_share_actor() {
        let (handle, _metrics, _temp) = test_handle();
        let owner = UserId::generate();

        let account = handle
            .open_account(owner, "Katherine Johnson".to_string(), AccountType::Savings, None)
            .await
            .unwrap();

        let clone = handle.clone();
        clone
            .deposit(DepositRequest {
                account_id: account.id,
                amount: Decimal::new(100, 2),
                description: None,
                method: None,
            })
            .await
            .unwrap();

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_ordering_preserved_under_interleaving() {
        let (handle, _metrics, _temp) = test_handle();
        let owner = UserId::generate();

        let account = handle
            .open_account(owner, "Katherine Johnson".to_string(), AccountType::Checking, None)
            .await
            .unwrap();

        for _ in 0..10 {
            handle
                .deposit(DepositRequest {
                    account_id: account.id,
                    amount: Decimal::new(100, 2),
                    description: None,
                    method: None,
                })
                .await
                .unwrap();
        }

        let transaction = handle
            .withdraw(
                WithdrawalRequest {
                    account_id: account.id,
                    amount: Decimal::new(1000, 2),
                    description: None,
                    method: None,
                    card_id: None,
                },
                owner,
            )
            .await
            .unwrap();
        assert_eq!(transaction.balance_after, Decimal::ZERO);

        handle.shutdown().await.unwrap();
    }
}
