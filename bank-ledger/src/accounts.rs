//! Account lifecycle: opening and closing

use crate::{
    error::{Error, Result},
    reference::ReferenceGenerator,
    storage::{Storage, WriteUnit},
    types::{Account, AccountId, AccountStatus, AccountType, UserId},
};
use chrono::Utc;
use rust_decimal::Decimal;

/// Open a new account for an owner
///
/// At most one active account per (owner, type); a second request for the
/// same type is rejected with [`Error::Conflict`]. A closed account of the
/// same type does not block a new one.
pub fn open_account(
    storage: &Storage,
    references: &ReferenceGenerator,
    owner: UserId,
    holder_name: String,
    account_type: AccountType,
    currency: Option<String>,
) -> Result<Account> {
    let already_open = storage
        .accounts_for_owner(owner)?
        .iter()
        .any(|a| a.account_type == account_type && a.is_active());
    if already_open {
        return Err(Error::Conflict(format!(
            "owner already has an active {} account",
            account_type.as_str()
        )));
    }

    let account = Account {
        id: AccountId::generate(),
        account_number: references.account_number(storage)?,
        account_type,
        balance: Decimal::ZERO,
        currency: currency.unwrap_or_else(|| "USD".to_string()),
        status: AccountStatus::Active,
        owner,
        holder_name,
        created_at: Utc::now(),
    };

    storage.commit(&WriteUnit {
        accounts: vec![account.clone()],
        ..Default::default()
    })?;

    tracing::info!(
        account_id = %account.id,
        account_number = %account.account_number,
        account_type = account_type.as_str(),
        "Account opened"
    );

    Ok(account)
}

/// Close an account
///
/// The account must belong to the caller, still be open, and carry a zero
/// balance. Closing is terminal; the account and its history remain readable.
pub fn close_account(storage: &Storage, account_id: AccountId, caller: UserId) -> Result<Account> {
    let mut account = storage.get_account(account_id)?;

    if account.owner != caller {
        return Err(Error::Forbidden(
            "account does not belong to the caller".to_string(),
        ));
    }
    if account.status == AccountStatus::Closed {
        return Err(Error::Conflict("account is already closed".to_string()));
    }
    if account.balance > Decimal::ZERO {
        return Err(Error::Conflict(format!(
            "account still holds {}, withdraw or transfer the balance first",
            account.balance
        )));
    }

    account.status = AccountStatus::Closed;

    storage.commit(&WriteUnit {
        accounts: vec![account.clone()],
        ..Default::default()
    })?;

    tracing::info!(account_id = %account.id, "Account closed");

    Ok(account)
}
