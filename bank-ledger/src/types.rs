//! Core types for the banking ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// Owning user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Wrap an existing UUID
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Raw UUID bytes (used for index keys)
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Wrap an existing UUID
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Raw UUID bytes (used for storage keys)
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Card identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardId(Uuid);

impl CardId {
    /// Wrap an existing UUID
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Raw UUID bytes (used for storage keys)
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction identifier (UUIDv7 for time-ordering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Wrap an existing UUID
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a fresh time-ordered id
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Raw UUID bytes (used for storage keys)
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Displayable 10-digit account number (unique per account)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountNumber(String);

impl AccountNumber {
    /// Create new account number
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 16-digit card number (unique per card)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardNumber(String);

impl CardNumber {
    /// Create new card number
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Account type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountType {
    /// Everyday checking account
    Checking,
    /// Savings account
    Savings,
    /// Investment account
    Investment,
}

impl AccountType {
    /// Stable string form (persisted and displayed)
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "CHECKING",
            AccountType::Savings => "SAVINGS",
            AccountType::Investment => "INVESTMENT",
        }
    }
}

impl FromStr for AccountType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CHECKING" => Ok(AccountType::Checking),
            "SAVINGS" => Ok(AccountType::Savings),
            "INVESTMENT" => Ok(AccountType::Investment),
            other => Err(Error::InvalidInput(format!(
                "invalid account type {other:?}, must be CHECKING, SAVINGS or INVESTMENT"
            ))),
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Account status (one-way Active -> Closed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    /// Open for all operations
    Active,
    /// Closed, terminal
    Closed,
}

/// Card type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardType {
    /// Physical debit card
    Debit,
    /// Physical credit card
    Credit,
    /// Virtual card (only issued while no live debit card exists)
    Virtual,
}

impl CardType {
    /// Stable string form (persisted and displayed)
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Debit => "DEBIT",
            CardType::Credit => "CREDIT",
            CardType::Virtual => "VIRTUAL",
        }
    }
}

impl FromStr for CardType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBIT" => Ok(CardType::Debit),
            "CREDIT" => Ok(CardType::Credit),
            "VIRTUAL" => Ok(CardType::Virtual),
            other => Err(Error::InvalidInput(format!(
                "invalid card type {other:?}, must be DEBIT, CREDIT or VIRTUAL"
            ))),
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Card status
///
/// Active <-> Blocked (unblock guarded by expiry); Active/Blocked -> Cancelled
/// is terminal. `Expired` is a read-time condition derived from the expiry
/// date; issuance conflict checks filter expired cards explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardStatus {
    /// Usable for spend tracking
    Active,
    /// Temporarily blocked by the holder
    Blocked,
    /// Past expiry date
    Expired,
    /// Cancelled, terminal
    Cancelled,
}

/// Transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Funds added to an account
    Deposit,
    /// Funds removed from an account (cash/ATM)
    Withdrawal,
    /// Debit side of an external transfer
    TransferOut,
    /// Credit side of an external transfer
    TransferIn,
    /// Either side of a same-owner transfer
    InternalTransfer,
}

/// Transaction status
///
/// Operations are synchronous and all-or-nothing: a row is only ever written
/// for a fully applied balance change, so `Completed` is the only reachable
/// status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Fully applied
    Completed,
}

/// A balance-holding account owned by one user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique account ID
    pub id: AccountId,

    /// Unique displayable 10-digit number
    pub account_number: AccountNumber,

    /// Account type (at most one Active per owner per type)
    pub account_type: AccountType,

    /// Current balance (exact decimal, never negative after a completed op)
    pub balance: Decimal,

    /// ISO 4217 currency code
    pub currency: String,

    /// Current status
    pub status: AccountStatus,

    /// Owning user
    pub owner: UserId,

    /// Owner display name (card holder name, transfer counterparty name)
    pub holder_name: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Whether the account accepts balance-affecting operations
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// A spend-authorization card linked to one account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    /// Unique card ID
    pub id: CardId,

    /// Unique generated 16-digit number
    pub card_number: CardNumber,

    /// Holder display name
    pub holder_name: String,

    /// Card type
    pub card_type: CardType,

    /// Expiry date (issuance + validity years)
    pub expiry_date: NaiveDate,

    /// Secret verification code
    pub cvv: String,

    /// Spending limit (> 0); limit changes never clamp current spend
    pub spending_limit: Decimal,

    /// Spend accumulated against the limit (>= 0)
    pub current_spent: Decimal,

    /// Current status
    pub status: CardStatus,

    /// Owning user
    pub owner: UserId,

    /// Linked account
    pub account: AccountId,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Card {
    /// Remaining spend headroom, floored at zero
    pub fn available_limit(&self) -> Decimal {
        (self.spending_limit - self.current_spent).max(Decimal::ZERO)
    }

    /// Whether the card is past its expiry date
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date < today
    }

    /// Whether this is a virtual card
    pub fn is_virtual(&self) -> bool {
        self.card_type == CardType::Virtual
    }

    /// Display form with all but the last four digits hidden
    pub fn masked_number(&self) -> String {
        let digits = self.card_number.as_str();
        if digits.len() < 16 {
            return digits.to_string();
        }
        format!("**** **** **** {}", &digits[12..])
    }
}

/// One immutable record of one balance change on one account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID
    pub id: TransactionId,

    /// Unique displayable reference (TXN + 12 alphanumerics)
    pub reference: String,

    /// Transaction kind
    pub kind: TransactionKind,

    /// Moved amount (> 0)
    pub amount: Decimal,

    /// Account balance after this transaction was applied
    pub balance_after: Decimal,

    /// Free-text description
    pub description: String,

    /// Status (always Completed, see type docs)
    pub status: TransactionStatus,

    /// Account this row belongs to
    pub account: AccountId,

    /// Counterparty account number (transfers only)
    pub counterparty_number: Option<AccountNumber>,

    /// Counterparty display name (external transfers only)
    pub counterparty_name: Option<String>,

    /// Deposit/withdrawal method tag, e.g. "ATM"
    pub method: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Deposit operation input
#[derive(Debug, Clone)]
pub struct DepositRequest {
    /// Target account
    pub account_id: AccountId,
    /// Amount to credit (> 0)
    pub amount: Decimal,
    /// Optional description (defaults to "Deposit")
    pub description: Option<String>,
    /// Optional method tag
    pub method: Option<String>,
}

/// Withdrawal operation input
#[derive(Debug, Clone)]
pub struct WithdrawalRequest {
    /// Source account
    pub account_id: AccountId,
    /// Amount to debit (> 0)
    pub amount: Decimal,
    /// Optional description
    pub description: Option<String>,
    /// Optional method tag; "ATM" engages card spend tracking
    pub method: Option<String>,
    /// Explicit card to debit the spend against (ATM only)
    pub card_id: Option<CardId>,
}

/// External transfer operation input
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Source account
    pub from_account_id: AccountId,
    /// Amount to move (> 0)
    pub amount: Decimal,
    /// Recipient account number (possibly another owner's)
    pub recipient_account_number: AccountNumber,
    /// Optional description
    pub description: Option<String>,
}

/// Internal (same-owner) transfer operation input
#[derive(Debug, Clone)]
pub struct InternalTransferRequest {
    /// Source account
    pub from_account_id: AccountId,
    /// Destination account
    pub to_account_id: AccountId,
    /// Amount to move (> 0)
    pub amount: Decimal,
    /// Optional description
    pub description: Option<String>,
}

/// Card issuance input
#[derive(Debug, Clone)]
pub struct IssueCardRequest {
    /// Account the card is linked to
    pub account_id: AccountId,
    /// Requested card type
    pub card_type: CardType,
    /// Spending limit (> 0); defaults from configuration when absent
    pub spending_limit: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_card(number: &str) -> Card {
        Card {
            id: CardId::generate(),
            card_number: CardNumber::new(number),
            holder_name: "Ada Lovelace".to_string(),
            card_type: CardType::Debit,
            expiry_date: NaiveDate::from_ymd_opt(2030, 1, 15).unwrap(),
            cvv: "123".to_string(),
            spending_limit: Decimal::new(500000, 2),
            current_spent: Decimal::new(120050, 2),
            status: CardStatus::Active,
            owner: UserId::generate(),
            account: AccountId::generate(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_account_type_from_str() {
        assert_eq!("checking".parse::<AccountType>().unwrap(), AccountType::Checking);
        assert_eq!("SAVINGS".parse::<AccountType>().unwrap(), AccountType::Savings);
        assert!(matches!(
            "GOLD".parse::<AccountType>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_card_type_from_str() {
        assert_eq!("virtual".parse::<CardType>().unwrap(), CardType::Virtual);
        assert!(matches!(
            "PREPAID".parse::<CardType>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_available_limit_floors_at_zero() {
        let mut card = test_card("4000111122223333");
        assert_eq!(card.available_limit(), Decimal::new(379950, 2));

        // A lowered limit does not clamp spend; headroom just bottoms out
        card.spending_limit = Decimal::new(100000, 2);
        assert_eq!(card.available_limit(), Decimal::ZERO);
    }

    #[test]
    fn test_card_expiry_is_derived() {
        let card = test_card("4000111122223333");
        assert!(!card.is_expired(NaiveDate::from_ymd_opt(2030, 1, 15).unwrap()));
        assert!(card.is_expired(NaiveDate::from_ymd_opt(2030, 1, 16).unwrap()));
    }

    #[test]
    fn test_masked_number() {
        let card = test_card("4000111122223333");
        assert_eq!(card.masked_number(), "**** **** **** 3333");
    }
}
