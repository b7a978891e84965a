//! Card lifecycle: issuance, status changes and spending limits
//!
//! Issuance enforces a per-account portfolio policy. A card is *live* when
//! its status is Active or Blocked and its expiry date has not passed:
//!
//! - at most one live debit card and one live credit card per account
//! - a virtual card cannot coexist with a live debit card, in either
//!   direction: issuing a debit card cancels the account's virtual cards

use crate::{
    config::CardConfig,
    error::{Error, Result},
    reference::ReferenceGenerator,
    storage::{Storage, WriteUnit},
    types::{Card, CardId, CardStatus, CardType, IssueCardRequest, UserId},
};
use chrono::{Months, Utc};
use rust_decimal::Decimal;

/// Issue a new card against an account
pub fn issue_card(
    storage: &Storage,
    references: &ReferenceGenerator,
    config: &CardConfig,
    request: &IssueCardRequest,
    caller: UserId,
) -> Result<Card> {
    if let Some(limit) = request.spending_limit {
        if limit <= Decimal::ZERO {
            return Err(Error::InvalidInput(
                "spending limit must be positive".to_string(),
            ));
        }
    }

    let account = storage.get_account(request.account_id)?;
    if account.owner != caller {
        return Err(Error::Forbidden(
            "account does not belong to the caller".to_string(),
        ));
    }
    if !account.is_active() {
        return Err(Error::InvalidState(
            "cannot issue a card against a closed account".to_string(),
        ));
    }

    let today = Utc::now().date_naive();
    let existing = storage.cards_for_account(account.id)?;
    let live = |c: &Card| {
        matches!(c.status, CardStatus::Active | CardStatus::Blocked) && !c.is_expired(today)
    };

    match request.card_type {
        CardType::Virtual => {
            if existing
                .iter()
                .any(|c| c.card_type == CardType::Debit && live(c))
            {
                return Err(Error::Conflict(
                    "account already has a live debit card".to_string(),
                ));
            }
        }
        CardType::Debit | CardType::Credit => {
            if existing
                .iter()
                .any(|c| c.card_type == request.card_type && live(c))
            {
                return Err(Error::Conflict(format!(
                    "account already has a live {} card",
                    request.card_type.as_str()
                )));
            }
        }
    }

    // A physical debit card supersedes the account's virtual cards
    let mut displaced: Vec<Card> = Vec::new();
    if request.card_type == CardType::Debit {
        for mut card in existing {
            if card.card_type == CardType::Virtual
                && matches!(card.status, CardStatus::Active | CardStatus::Blocked)
            {
                card.status = CardStatus::Cancelled;
                displaced.push(card);
            }
        }
    }

    let now = Utc::now();
    let card = Card {
        id: CardId::generate(),
        card_number: references.card_number(storage)?,
        holder_name: account.holder_name.clone(),
        card_type: request.card_type,
        expiry_date: now.date_naive() + Months::new(12 * config.validity_years),
        cvv: references.cvv(),
        spending_limit: request
            .spending_limit
            .unwrap_or(config.default_spending_limit),
        current_spent: Decimal::ZERO,
        status: CardStatus::Active,
        owner: caller,
        account: account.id,
        created_at: now,
    };

    let mut cards = displaced;
    cards.push(card.clone());
    storage.commit(&WriteUnit {
        cards,
        ..Default::default()
    })?;

    tracing::info!(
        card_id = %card.id,
        account_id = %account.id,
        card_type = card.card_type.as_str(),
        "Card issued"
    );

    Ok(card)
}

/// Block a card, suspending its use until unblocked
pub fn block_card(storage: &Storage, card_id: CardId, caller: UserId) -> Result<Card> {
    let mut card = card_owned_by(storage, card_id, caller)?;

    if card.status == CardStatus::Cancelled {
        return Err(Error::Conflict(
            "cancelled cards cannot be blocked".to_string(),
        ));
    }

    card.status = CardStatus::Blocked;
    persist(storage, &card)?;

    tracing::info!(card_id = %card.id, "Card blocked");
    Ok(card)
}

/// Unblock a previously blocked card
///
/// A card that expired while blocked cannot be reactivated; the rejection
/// writes nothing, so the stored status stays Blocked.
pub fn unblock_card(storage: &Storage, card_id: CardId, caller: UserId) -> Result<Card> {
    let mut card = card_owned_by(storage, card_id, caller)?;

    if card.status != CardStatus::Blocked {
        return Err(Error::Conflict("card is not blocked".to_string()));
    }

    if card.is_expired(Utc::now().date_naive()) {
        return Err(Error::Expired("card is past its expiry date".to_string()));
    }

    card.status = CardStatus::Active;
    persist(storage, &card)?;

    tracing::info!(card_id = %card.id, "Card unblocked");
    Ok(card)
}

/// Cancel a card permanently
pub fn cancel_card(storage: &Storage, card_id: CardId, caller: UserId) -> Result<Card> {
    let mut card = card_owned_by(storage, card_id, caller)?;

    card.status = CardStatus::Cancelled;
    persist(storage, &card)?;

    tracing::info!(card_id = %card.id, "Card cancelled");
    Ok(card)
}

/// Change the spending limit of an active card
///
/// Accumulated spend is untouched, so lowering the limit below the current
/// spend leaves the card with no available headroom.
pub fn update_spending_limit(
    storage: &Storage,
    card_id: CardId,
    new_limit: Decimal,
    caller: UserId,
) -> Result<Card> {
    if new_limit <= Decimal::ZERO {
        return Err(Error::InvalidInput(
            "spending limit must be positive".to_string(),
        ));
    }

    let mut card = card_owned_by(storage, card_id, caller)?;
    if card.status != CardStatus::Active {
        return Err(Error::InvalidState("card is not active".to_string()));
    }

    card.spending_limit = new_limit;
    persist(storage, &card)?;

    tracing::info!(card_id = %card.id, limit = %new_limit, "Spending limit updated");
    Ok(card)
}

fn card_owned_by(storage: &Storage, card_id: CardId, caller: UserId) -> Result<Card> {
    let card = storage.get_card(card_id)?;
    if card.owner != caller {
        return Err(Error::Forbidden(
            "card does not belong to the caller".to_string(),
        ));
    }
    Ok(card)
}

fn persist(storage: &Storage, card: &Card) -> Result<()> {
    storage.commit(&WriteUnit {
        cards: vec![card.clone()],
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::open_account;
    use crate::types::{Account, AccountType};
    use crate::Config;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn test_setup() -> (Storage, ReferenceGenerator, CardConfig, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        let storage = Storage::open(&config).unwrap();
        let references = ReferenceGenerator::new(&config.references);
        (storage, references, config.cards, temp_dir)
    }

    fn seed_account(storage: &Storage, references: &ReferenceGenerator, owner: UserId) -> Account {
        open_account(
            storage,
            references,
            owner,
            "Ada Lovelace".to_string(),
            AccountType::Checking,
            None,
        )
        .unwrap()
    }

    fn issue(
        storage: &Storage,
        references: &ReferenceGenerator,
        config: &CardConfig,
        account: &Account,
        card_type: CardType,
    ) -> Result<Card> {
        issue_card(
            storage,
            references,
            config,
            &IssueCardRequest {
                account_id: account.id,
                card_type,
                spending_limit: None,
            },
            account.owner,
        )
    }

    #[test]
    fn test_issue_card_defaults() {
        let (storage, references, cards, _temp) = test_setup();
        let account = seed_account(&storage, &references, UserId::generate());

        let card = issue(&storage, &references, &cards, &account, CardType::Debit).unwrap();

        assert_eq!(card.status, CardStatus::Active);
        assert_eq!(card.spending_limit, cards.default_spending_limit);
        assert_eq!(card.current_spent, Decimal::ZERO);
        assert_eq!(card.holder_name, "Ada Lovelace");
        assert_eq!(card.card_number.as_str().len(), 16);
        assert_eq!(card.cvv.len(), 3);

        let expected_expiry = Utc::now().date_naive() + Months::new(12 * cards.validity_years);
        assert_eq!(card.expiry_date, expected_expiry);
    }

    #[test]
    fn test_one_live_debit_per_account() {
        let (storage, references, cards, _temp) = test_setup();
        let account = seed_account(&storage, &references, UserId::generate());

        issue(&storage, &references, &cards, &account, CardType::Debit).unwrap();
        let second = issue(&storage, &references, &cards, &account, CardType::Debit);
        assert!(matches!(second, Err(Error::Conflict(_))));

        // Credit cards are counted separately
        issue(&storage, &references, &cards, &account, CardType::Credit).unwrap();
    }

    #[test]
    fn test_virtual_conflicts_with_live_debit() {
        let (storage, references, cards, _temp) = test_setup();
        let account = seed_account(&storage, &references, UserId::generate());

        issue(&storage, &references, &cards, &account, CardType::Debit).unwrap();
        let virtual_card = issue(&storage, &references, &cards, &account, CardType::Virtual);
        assert!(matches!(virtual_card, Err(Error::Conflict(_))));
    }

    #[test]
    fn test_debit_issuance_cancels_virtual_cards() {
        let (storage, references, cards, _temp) = test_setup();
        let account = seed_account(&storage, &references, UserId::generate());

        let v1 = issue(&storage, &references, &cards, &account, CardType::Virtual).unwrap();
        let v2 = issue(&storage, &references, &cards, &account, CardType::Virtual).unwrap();

        issue(&storage, &references, &cards, &account, CardType::Debit).unwrap();

        assert_eq!(storage.get_card(v1.id).unwrap().status, CardStatus::Cancelled);
        assert_eq!(storage.get_card(v2.id).unwrap().status, CardStatus::Cancelled);
    }

    #[test]
    fn test_cancelled_card_does_not_block_issuance() {
        let (storage, references, cards, _temp) = test_setup();
        let account = seed_account(&storage, &references, UserId::generate());

        let first = issue(&storage, &references, &cards, &account, CardType::Debit).unwrap();
        cancel_card(&storage, first.id, account.owner).unwrap();

        issue(&storage, &references, &cards, &account, CardType::Debit).unwrap();
    }

    #[test]
    fn test_issue_rejects_non_positive_limit() {
        let (storage, references, cards, _temp) = test_setup();
        let account = seed_account(&storage, &references, UserId::generate());

        let result = issue_card(
            &storage,
            &references,
            &cards,
            &IssueCardRequest {
                account_id: account.id,
                card_type: CardType::Debit,
                spending_limit: Some(Decimal::ZERO),
            },
            account.owner,
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_issue_requires_ownership() {
        let (storage, references, cards, _temp) = test_setup();
        let account = seed_account(&storage, &references, UserId::generate());

        let result = issue_card(
            &storage,
            &references,
            &cards,
            &IssueCardRequest {
                account_id: account.id,
                card_type: CardType::Debit,
                spending_limit: None,
            },
            UserId::generate(),
        );
        assert!(matches!(result, Err(Error::Forbidden(_))));
    }

    #[test]
    fn test_block_unblock_cycle() {
        let (storage, references, cards, _temp) = test_setup();
        let account = seed_account(&storage, &references, UserId::generate());
        let card = issue(&storage, &references, &cards, &account, CardType::Debit).unwrap();

        let blocked = block_card(&storage, card.id, account.owner).unwrap();
        assert_eq!(blocked.status, CardStatus::Blocked);

        let active = unblock_card(&storage, card.id, account.owner).unwrap();
        assert_eq!(active.status, CardStatus::Active);
    }

    #[test]
    fn test_unblock_requires_blocked_status() {
        let (storage, references, cards, _temp) = test_setup();
        let account = seed_account(&storage, &references, UserId::generate());
        let card = issue(&storage, &references, &cards, &account, CardType::Debit).unwrap();

        let result = unblock_card(&storage, card.id, account.owner);
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[test]
    fn test_unblock_expired_card_rejected_without_mutation() {
        let (storage, references, cards, _temp) = test_setup();
        let account = seed_account(&storage, &references, UserId::generate());
        let mut card = issue(&storage, &references, &cards, &account, CardType::Debit).unwrap();

        card.status = CardStatus::Blocked;
        card.expiry_date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        storage
            .commit(&WriteUnit {
                cards: vec![card.clone()],
                ..Default::default()
            })
            .unwrap();

        let result = unblock_card(&storage, card.id, account.owner);
        assert!(matches!(result, Err(Error::Expired(_))));

        // The rejection writes nothing; the stored card stays blocked
        assert_eq!(storage.get_card(card.id).unwrap().status, CardStatus::Blocked);
    }

    #[test]
    fn test_cancelled_card_cannot_be_blocked() {
        let (storage, references, cards, _temp) = test_setup();
        let account = seed_account(&storage, &references, UserId::generate());
        let card = issue(&storage, &references, &cards, &account, CardType::Debit).unwrap();

        cancel_card(&storage, card.id, account.owner).unwrap();
        let result = block_card(&storage, card.id, account.owner);
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[test]
    fn test_update_spending_limit() {
        let (storage, references, cards, _temp) = test_setup();
        let account = seed_account(&storage, &references, UserId::generate());
        let card = issue(&storage, &references, &cards, &account, CardType::Debit).unwrap();

        let updated =
            update_spending_limit(&storage, card.id, Decimal::new(100000, 2), account.owner)
                .unwrap();
        assert_eq!(updated.spending_limit, Decimal::new(100000, 2));

        let rejected = update_spending_limit(&storage, card.id, Decimal::ZERO, account.owner);
        assert!(matches!(rejected, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_update_limit_requires_active_card() {
        let (storage, references, cards, _temp) = test_setup();
        let account = seed_account(&storage, &references, UserId::generate());
        let card = issue(&storage, &references, &cards, &account, CardType::Debit).unwrap();

        block_card(&storage, card.id, account.owner).unwrap();
        let result =
            update_spending_limit(&storage, card.id, Decimal::new(100000, 2), account.owner);
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }
}
