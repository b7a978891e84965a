//! Ledger engine: the four balance-affecting operations
//!
//! Every operation follows the same pattern: validate preconditions against
//! current persisted state, compute the new balance(s), then commit balance
//! mutation(s) and transaction row(s) as one [`WriteUnit`]. Precondition
//! failures return before any unit is built, so a rejected operation leaves
//! no trace in the ledger.
//!
//! These functions assume callers serialize mutations (see [`crate::actor`]);
//! they perform no locking of their own.

use crate::{
    error::{Error, Result},
    reference::ReferenceGenerator,
    storage::{Storage, WriteUnit},
    types::{Account, Card, CardStatus, CardType, DepositRequest, InternalTransferRequest,
            Transaction, TransactionId, TransactionKind, TransactionStatus, TransferRequest,
            UserId, WithdrawalRequest},
};
use chrono::Utc;
use rust_decimal::Decimal;

/// Credit an account
pub fn deposit(
    storage: &Storage,
    references: &ReferenceGenerator,
    request: &DepositRequest,
) -> Result<Transaction> {
    validate_amount(request.amount)?;

    let mut account = storage.get_account(request.account_id)?;
    if !account.is_active() {
        return Err(Error::InvalidState(
            "cannot deposit to a closed account".to_string(),
        ));
    }

    account.balance += request.amount;

    let transaction = Transaction {
        id: TransactionId::generate(),
        reference: references.transaction_reference(storage)?,
        kind: TransactionKind::Deposit,
        amount: request.amount,
        balance_after: account.balance,
        description: request
            .description
            .clone()
            .unwrap_or_else(|| "Deposit".to_string()),
        status: TransactionStatus::Completed,
        account: account.id,
        counterparty_number: None,
        counterparty_name: None,
        method: request.method.clone(),
        created_at: Utc::now(),
    };

    storage.commit(&WriteUnit {
        accounts: vec![account],
        transactions: vec![transaction.clone()],
        ..Default::default()
    })?;

    tracing::info!(
        account_id = %request.account_id,
        reference = %transaction.reference,
        "Deposit completed"
    );

    Ok(transaction)
}

/// Debit an account, with card spend tracking for ATM withdrawals
pub fn withdraw(
    storage: &Storage,
    references: &ReferenceGenerator,
    request: &WithdrawalRequest,
    caller: UserId,
) -> Result<Transaction> {
    validate_amount(request.amount)?;

    let mut account = storage.get_account(request.account_id)?;
    if account.owner != caller {
        return Err(Error::Forbidden(
            "account does not belong to the caller".to_string(),
        ));
    }
    if !account.is_active() {
        return Err(Error::InvalidState("account is not active".to_string()));
    }
    if account.balance < request.amount {
        return Err(Error::InsufficientFunds(format!(
            "balance {} is below the requested {}",
            account.balance, request.amount
        )));
    }

    let is_atm = request
        .method
        .as_deref()
        .is_some_and(|m| m.eq_ignore_ascii_case("ATM"));

    let mut used_card = if is_atm {
        resolve_atm_card(storage, request, &account, caller)?
    } else {
        None
    };

    if let Some(card) = used_card.as_mut() {
        let available = card.spending_limit - card.current_spent;
        if request.amount > available {
            return Err(Error::LimitExceeded(format!(
                "withdrawal exceeds card spending limit, available: {}",
                available
            )));
        }
        card.current_spent += request.amount;
    }

    account.balance -= request.amount;

    let description = request.description.clone().unwrap_or_else(|| {
        if is_atm {
            "ATM Withdrawal".to_string()
        } else {
            "Withdrawal".to_string()
        }
    });

    let transaction = Transaction {
        id: TransactionId::generate(),
        reference: references.transaction_reference(storage)?,
        kind: TransactionKind::Withdrawal,
        amount: request.amount,
        balance_after: account.balance,
        description,
        status: TransactionStatus::Completed,
        account: account.id,
        counterparty_number: None,
        counterparty_name: None,
        method: request.method.clone(),
        created_at: Utc::now(),
    };

    storage.commit(&WriteUnit {
        accounts: vec![account],
        cards: used_card.into_iter().collect(),
        transactions: vec![transaction.clone()],
    })?;

    tracing::info!(
        account_id = %request.account_id,
        reference = %transaction.reference,
        atm = is_atm,
        "Withdrawal completed"
    );

    Ok(transaction)
}

/// Resolve the card an ATM withdrawal debits its spend against
///
/// An explicit card must belong to the caller, be linked to the source
/// account and be active. Without one, the account's first active debit card
/// is used; if none exists the withdrawal proceeds without card tracking.
fn resolve_atm_card(
    storage: &Storage,
    request: &WithdrawalRequest,
    account: &Account,
    caller: UserId,
) -> Result<Option<Card>> {
    if let Some(card_id) = request.card_id {
        let card = storage.get_card(card_id)?;

        if card.owner != caller {
            return Err(Error::Forbidden(
                "card does not belong to the caller".to_string(),
            ));
        }
        if card.account != account.id {
            return Err(Error::InvalidInput(
                "card is not linked to this account".to_string(),
            ));
        }
        if card.status != CardStatus::Active {
            return Err(Error::InvalidState("card is not active".to_string()));
        }

        return Ok(Some(card));
    }

    let card = storage
        .cards_for_account(account.id)?
        .into_iter()
        .find(|c| c.card_type == CardType::Debit && c.status == CardStatus::Active);

    Ok(card)
}

/// Move funds to another account by number, possibly across owners
///
/// Writes a `TransferOut` row on the source and a `TransferIn` row on the
/// recipient, each carrying its own post-balance; returns the sender's row.
pub fn transfer(
    storage: &Storage,
    references: &ReferenceGenerator,
    request: &TransferRequest,
    caller: UserId,
) -> Result<Transaction> {
    validate_amount(request.amount)?;

    let mut from_account = storage.get_account(request.from_account_id)?;
    if from_account.owner != caller {
        return Err(Error::Forbidden(
            "account does not belong to the caller".to_string(),
        ));
    }
    if !from_account.is_active() {
        return Err(Error::InvalidState("account is not active".to_string()));
    }
    if from_account.balance < request.amount {
        return Err(Error::InsufficientFunds(format!(
            "balance {} is below the requested {}",
            from_account.balance, request.amount
        )));
    }

    // A storage miss here is caller error, not an internal condition
    let mut recipient = storage
        .find_account_by_number(&request.recipient_account_number)?
        .ok_or_else(|| Error::NotFound("recipient account not found".to_string()))?;

    if recipient.id == from_account.id {
        return Err(Error::InvalidInput(
            "cannot transfer to the same account".to_string(),
        ));
    }
    if !recipient.is_active() {
        return Err(Error::InvalidState(
            "cannot transfer to a closed account".to_string(),
        ));
    }

    from_account.balance -= request.amount;
    recipient.balance += request.amount;

    let sender_row = Transaction {
        id: TransactionId::generate(),
        reference: references.transaction_reference(storage)?,
        kind: TransactionKind::TransferOut,
        amount: request.amount,
        balance_after: from_account.balance,
        description: request.description.clone().unwrap_or_else(|| {
            format!("Transfer to {}", request.recipient_account_number)
        }),
        status: TransactionStatus::Completed,
        account: from_account.id,
        counterparty_number: Some(recipient.account_number.clone()),
        counterparty_name: Some(recipient.holder_name.clone()),
        method: None,
        created_at: Utc::now(),
    };

    let recipient_row = Transaction {
        id: TransactionId::generate(),
        reference: references.transaction_reference(storage)?,
        kind: TransactionKind::TransferIn,
        amount: request.amount,
        balance_after: recipient.balance,
        description: format!("Transfer from {}", from_account.account_number),
        status: TransactionStatus::Completed,
        account: recipient.id,
        counterparty_number: Some(from_account.account_number.clone()),
        counterparty_name: Some(from_account.holder_name.clone()),
        method: None,
        created_at: Utc::now(),
    };

    storage.commit(&WriteUnit {
        accounts: vec![from_account, recipient],
        transactions: vec![sender_row.clone(), recipient_row],
        ..Default::default()
    })?;

    tracing::info!(
        from_account = %request.from_account_id,
        recipient = %request.recipient_account_number,
        reference = %sender_row.reference,
        "Transfer completed"
    );

    Ok(sender_row)
}

/// Move funds between two accounts of the same owner
///
/// Writes one `InternalTransfer` row per account; returns the source row.
pub fn internal_transfer(
    storage: &Storage,
    references: &ReferenceGenerator,
    request: &InternalTransferRequest,
    caller: UserId,
) -> Result<Transaction> {
    if request.from_account_id == request.to_account_id {
        return Err(Error::InvalidInput(
            "cannot transfer to the same account".to_string(),
        ));
    }
    validate_amount(request.amount)?;

    let mut from_account = storage.get_account(request.from_account_id)?;
    let mut to_account = storage.get_account(request.to_account_id)?;

    if from_account.owner != caller || to_account.owner != caller {
        return Err(Error::Forbidden(
            "both accounts must belong to the caller".to_string(),
        ));
    }
    if !from_account.is_active() || !to_account.is_active() {
        return Err(Error::InvalidState(
            "one or both accounts are not active".to_string(),
        ));
    }
    if from_account.balance < request.amount {
        return Err(Error::InsufficientFunds(format!(
            "balance {} is below the requested {}",
            from_account.balance, request.amount
        )));
    }

    from_account.balance -= request.amount;
    to_account.balance += request.amount;

    let from_row = Transaction {
        id: TransactionId::generate(),
        reference: references.transaction_reference(storage)?,
        kind: TransactionKind::InternalTransfer,
        amount: request.amount,
        balance_after: from_account.balance,
        description: request.description.clone().unwrap_or_else(|| {
            format!("Internal transfer to {}", to_account.account_number)
        }),
        status: TransactionStatus::Completed,
        account: from_account.id,
        counterparty_number: Some(to_account.account_number.clone()),
        counterparty_name: None,
        method: None,
        created_at: Utc::now(),
    };

    let to_row = Transaction {
        id: TransactionId::generate(),
        reference: references.transaction_reference(storage)?,
        kind: TransactionKind::InternalTransfer,
        amount: request.amount,
        balance_after: to_account.balance,
        description: format!("Internal transfer from {}", from_account.account_number),
        status: TransactionStatus::Completed,
        account: to_account.id,
        counterparty_number: Some(from_account.account_number.clone()),
        counterparty_name: None,
        method: None,
        created_at: Utc::now(),
    };

    storage.commit(&WriteUnit {
        accounts: vec![from_account, to_account],
        transactions: vec![from_row.clone(), to_row],
        ..Default::default()
    })?;

    tracing::info!(
        from_account = %request.from_account_id,
        to_account = %request.to_account_id,
        reference = %from_row.reference,
        "Internal transfer completed"
    );

    Ok(from_row)
}

fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidInput("amount must be positive".to_string()));
    }
    Ok(())
}
