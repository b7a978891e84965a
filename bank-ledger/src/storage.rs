//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Account records (key: account_id)
//! - `cards` - Card records (key: card_id)
//! - `transactions` - Append-only transaction rows (key: transaction_id)
//! - `indices` - Secondary indices for unique numbers and listings
//!
//! All multi-row mutations go through [`Storage::commit`], which applies one
//! [`WriteUnit`] as a single RocksDB `WriteBatch`: the unit lands fully or
//! not at all.

use crate::{
    error::{Error, Result},
    types::{Account, AccountId, AccountNumber, Card, CardId, CardNumber, Transaction,
            TransactionId, UserId},
    Config,
};
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode,
              Options, WriteBatch, DB};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_CARDS: &str = "cards";
const CF_TRANSACTIONS: &str = "transactions";
const CF_INDICES: &str = "indices";

/// Index key prefixes
const IDX_ACCOUNT_NUMBER: &[u8] = b"an|";
const IDX_CARD_NUMBER: &[u8] = b"cn|";
const IDX_TXN_REFERENCE: &[u8] = b"tr|";
const IDX_OWNER_ACCOUNT: &[u8] = b"oa|";
const IDX_OWNER_CARD: &[u8] = b"oc|";
const IDX_ACCOUNT_CARD: &[u8] = b"ac|";
const IDX_ACCOUNT_TXN: &[u8] = b"at|";

/// One atomic unit of mutated rows
///
/// Every engine/lifecycle operation collects its updated accounts, touched
/// cards and new transaction rows here and commits them in one batch.
#[derive(Debug, Default)]
pub struct WriteUnit {
    /// Accounts with updated balances or status
    pub accounts: Vec<Account>,

    /// Cards with updated spend totals or status
    pub cards: Vec<Card>,

    /// New immutable transaction rows
    pub transactions: Vec<Transaction>,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for the append-heavy transaction log
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_CARDS, Self::cf_options_records()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_transactions()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_records() -> Options {
        let mut opts = Options::default();
        // Accounts and cards are frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_transactions() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Point lookups on unique numbers benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Account operations

    /// Get account by ID
    pub fn get_account(&self, account_id: AccountId) -> Result<Account> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        let value = self
            .db
            .get_cf(cf, account_id.as_bytes())?
            .ok_or_else(|| Error::NotFound(format!("account not found: {}", account_id)))?;

        let account: Account = bincode::deserialize(&value)?;
        Ok(account)
    }

    /// Look up an account by its unique number
    pub fn find_account_by_number(&self, number: &AccountNumber) -> Result<Option<Account>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let key = index_key_unique(IDX_ACCOUNT_NUMBER, number.as_str().as_bytes());

        match self.db.get_cf(cf, &key)? {
            Some(value) => {
                let id = AccountId::new(uuid_from_slice(&value)?);
                Ok(Some(self.get_account(id)?))
            }
            None => Ok(None),
        }
    }

    /// Whether an account number is already taken
    pub fn account_number_exists(&self, number: &AccountNumber) -> Result<bool> {
        let cf = self.cf_handle(CF_INDICES)?;
        let key = index_key_unique(IDX_ACCOUNT_NUMBER, number.as_str().as_bytes());
        Ok(self.db.get_cf(cf, &key)?.is_some())
    }

    /// All accounts belonging to one owner
    pub fn accounts_for_owner(&self, owner: UserId) -> Result<Vec<Account>> {
        let ids = self.scan_child_ids(IDX_OWNER_ACCOUNT, owner.as_bytes())?;

        let mut accounts = Vec::with_capacity(ids.len());
        for id in ids {
            accounts.push(self.get_account(AccountId::new(id))?);
        }
        Ok(accounts)
    }

    // Card operations

    /// Get card by ID
    pub fn get_card(&self, card_id: CardId) -> Result<Card> {
        let cf = self.cf_handle(CF_CARDS)?;
        let value = self
            .db
            .get_cf(cf, card_id.as_bytes())?
            .ok_or_else(|| Error::NotFound(format!("card not found: {}", card_id)))?;

        let card: Card = bincode::deserialize(&value)?;
        Ok(card)
    }

    /// Whether a card number is already taken
    pub fn card_number_exists(&self, number: &CardNumber) -> Result<bool> {
        let cf = self.cf_handle(CF_INDICES)?;
        let key = index_key_unique(IDX_CARD_NUMBER, number.as_str().as_bytes());
        Ok(self.db.get_cf(cf, &key)?.is_some())
    }

    /// All cards linked to one account
    pub fn cards_for_account(&self, account_id: AccountId) -> Result<Vec<Card>> {
        let ids = self.scan_child_ids(IDX_ACCOUNT_CARD, account_id.as_bytes())?;

        let mut cards = Vec::with_capacity(ids.len());
        for id in ids {
            cards.push(self.get_card(CardId::new(id))?);
        }
        Ok(cards)
    }

    /// All cards belonging to one owner
    pub fn cards_for_owner(&self, owner: UserId) -> Result<Vec<Card>> {
        let ids = self.scan_child_ids(IDX_OWNER_CARD, owner.as_bytes())?;

        let mut cards = Vec::with_capacity(ids.len());
        for id in ids {
            cards.push(self.get_card(CardId::new(id))?);
        }
        Ok(cards)
    }

    // Transaction operations

    /// Get transaction by ID
    pub fn get_transaction(&self, transaction_id: TransactionId) -> Result<Transaction> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let value = self
            .db
            .get_cf(cf, transaction_id.as_bytes())?
            .ok_or_else(|| Error::NotFound(format!("transaction not found: {}", transaction_id)))?;

        let transaction: Transaction = bincode::deserialize(&value)?;
        Ok(transaction)
    }

    /// Look up a transaction by its unique reference
    pub fn find_transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let key = index_key_unique(IDX_TXN_REFERENCE, reference.as_bytes());

        match self.db.get_cf(cf, &key)? {
            Some(value) => {
                let id = TransactionId::new(uuid_from_slice(&value)?);
                Ok(Some(self.get_transaction(id)?))
            }
            None => Ok(None),
        }
    }

    /// Whether a transaction reference is already taken
    pub fn transaction_reference_exists(&self, reference: &str) -> Result<bool> {
        let cf = self.cf_handle(CF_INDICES)?;
        let key = index_key_unique(IDX_TXN_REFERENCE, reference.as_bytes());
        Ok(self.db.get_cf(cf, &key)?.is_some())
    }

    /// Transaction history for one account, newest first
    pub fn transactions_for_account(&self, account_id: AccountId) -> Result<Vec<Transaction>> {
        let cf = self.cf_handle(CF_INDICES)?;

        let mut prefix = IDX_ACCOUNT_TXN.to_vec();
        prefix.extend_from_slice(account_id.as_bytes());

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut transactions = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            // Key layout: prefix(3) || account(16) || timestamp(8) || txn(16)
            if key.len() >= prefix.len() + 24 {
                let id = uuid_from_slice(&key[prefix.len() + 8..prefix.len() + 24])?;
                transactions.push(self.get_transaction(TransactionId::new(id))?);
            }
        }

        // Index keys ascend by timestamp; history reads newest first
        transactions.reverse();
        Ok(transactions)
    }

    /// Transaction history for one account within a time range (inclusive), newest first
    pub fn transactions_for_account_between(
        &self,
        account_id: AccountId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let cf = self.cf_handle(CF_INDICES)?;

        let mut prefix = IDX_ACCOUNT_TXN.to_vec();
        prefix.extend_from_slice(account_id.as_bytes());

        let mut start = prefix.clone();
        start.extend_from_slice(&timestamp_nanos(&from)?.to_be_bytes());

        let to_nanos = timestamp_nanos(&to)?;

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&start, Direction::Forward));

        let mut transactions = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) || key.len() < prefix.len() + 24 {
                break;
            }
            let ts_bytes: [u8; 8] = key[prefix.len()..prefix.len() + 8]
                .try_into()
                .map_err(|_| Error::Storage("corrupt transaction index key".to_string()))?;
            if i64::from_be_bytes(ts_bytes) > to_nanos {
                break;
            }
            let id = uuid_from_slice(&key[prefix.len() + 8..prefix.len() + 24])?;
            transactions.push(self.get_transaction(TransactionId::new(id))?);
        }

        transactions.reverse();
        Ok(transactions)
    }

    // Atomic commit

    /// Apply one unit of mutations as a single atomic batch
    pub fn commit(&self, unit: &WriteUnit) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        let cf_cards = self.cf_handle(CF_CARDS)?;
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        for account in &unit.accounts {
            batch.put_cf(cf_accounts, account.id.as_bytes(), bincode::serialize(account)?);

            let number_key =
                index_key_unique(IDX_ACCOUNT_NUMBER, account.account_number.as_str().as_bytes());
            batch.put_cf(cf_indices, &number_key, account.id.as_bytes());

            let owner_key =
                index_key_child(IDX_OWNER_ACCOUNT, account.owner.as_bytes(), account.id.as_bytes());
            batch.put_cf(cf_indices, &owner_key, b"");
        }

        for card in &unit.cards {
            batch.put_cf(cf_cards, card.id.as_bytes(), bincode::serialize(card)?);

            let number_key =
                index_key_unique(IDX_CARD_NUMBER, card.card_number.as_str().as_bytes());
            batch.put_cf(cf_indices, &number_key, card.id.as_bytes());

            let owner_key =
                index_key_child(IDX_OWNER_CARD, card.owner.as_bytes(), card.id.as_bytes());
            batch.put_cf(cf_indices, &owner_key, b"");

            let account_key =
                index_key_child(IDX_ACCOUNT_CARD, card.account.as_bytes(), card.id.as_bytes());
            batch.put_cf(cf_indices, &account_key, b"");
        }

        for transaction in &unit.transactions {
            batch.put_cf(
                cf_transactions,
                transaction.id.as_bytes(),
                bincode::serialize(transaction)?,
            );

            let reference_key =
                index_key_unique(IDX_TXN_REFERENCE, transaction.reference.as_bytes());
            batch.put_cf(cf_indices, &reference_key, transaction.id.as_bytes());

            let history_key = index_key_account_txn(
                transaction.account.as_bytes(),
                timestamp_nanos(&transaction.created_at)?,
                transaction.id.as_bytes(),
            );
            batch.put_cf(cf_indices, &history_key, b"");
        }

        self.db.write(batch)?;

        tracing::debug!(
            accounts = unit.accounts.len(),
            cards = unit.cards.len(),
            transactions = unit.transactions.len(),
            "Write unit committed"
        );

        Ok(())
    }

    // Index scans

    /// Collect child UUIDs under a `prefix || parent_id` index range
    fn scan_child_ids(&self, prefix: &[u8], parent: &[u8; 16]) -> Result<Vec<Uuid>> {
        let cf = self.cf_handle(CF_INDICES)?;

        let mut range = prefix.to_vec();
        range.extend_from_slice(parent);

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&range, Direction::Forward));

        let mut ids = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&range) {
                break;
            }
            if key.len() >= range.len() + 16 {
                ids.push(uuid_from_slice(&key[range.len()..range.len() + 16])?);
            }
        }
        Ok(ids)
    }
}

// Index key helpers

fn index_key_unique(prefix: &[u8], unique: &[u8]) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(unique);
    key
}

fn index_key_child(prefix: &[u8], parent: &[u8; 16], child: &[u8; 16]) -> Vec<u8> {
    let mut key = prefix.to_vec();
    key.extend_from_slice(parent);
    key.extend_from_slice(child);
    key
}

fn index_key_account_txn(account: &[u8; 16], timestamp: i64, txn: &[u8; 16]) -> Vec<u8> {
    let mut key = IDX_ACCOUNT_TXN.to_vec();
    key.extend_from_slice(account);
    key.extend_from_slice(&timestamp.to_be_bytes());
    key.extend_from_slice(txn);
    key
}

fn timestamp_nanos(ts: &DateTime<Utc>) -> Result<i64> {
    // Nanosecond precision covers dates up to ~2262; beyond that the index
    // key would misorder, so refuse rather than default
    ts.timestamp_nanos_opt()
        .ok_or_else(|| Error::Storage(format!("timestamp out of range: {}", ts)))
}

fn uuid_from_slice(bytes: &[u8]) -> Result<Uuid> {
    Uuid::from_slice(bytes).map_err(|e| Error::Storage(format!("corrupt index entry: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountStatus, AccountType, TransactionKind, TransactionStatus};
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_account(owner: UserId, number: &str) -> Account {
        Account {
            id: AccountId::generate(),
            account_number: AccountNumber::new(number),
            account_type: AccountType::Checking,
            balance: Decimal::new(10000, 2),
            currency: "USD".to_string(),
            status: AccountStatus::Active,
            owner,
            holder_name: "Grace Hopper".to_string(),
            created_at: Utc::now(),
        }
    }

    fn test_transaction(account: AccountId, reference: &str, created_at: DateTime<Utc>) -> Transaction {
        Transaction {
            id: TransactionId::generate(),
            reference: reference.to_string(),
            kind: TransactionKind::Deposit,
            amount: Decimal::new(2500, 2),
            balance_after: Decimal::new(12500, 2),
            description: "Deposit".to_string(),
            status: TransactionStatus::Completed,
            account,
            counterparty_number: None,
            counterparty_name: None,
            method: None,
            created_at,
        }
    }

    #[test]
    fn test_account_roundtrip_and_number_index() {
        let (storage, _temp) = test_storage();
        let account = test_account(UserId::generate(), "1234567890");

        storage
            .commit(&WriteUnit {
                accounts: vec![account.clone()],
                ..Default::default()
            })
            .unwrap();

        let by_id = storage.get_account(account.id).unwrap();
        assert_eq!(by_id.account_number, account.account_number);

        let by_number = storage
            .find_account_by_number(&account.account_number)
            .unwrap()
            .unwrap();
        assert_eq!(by_number.id, account.id);

        assert!(storage.account_number_exists(&account.account_number).unwrap());
        assert!(!storage
            .account_number_exists(&AccountNumber::new("0000000000"))
            .unwrap());
    }

    #[test]
    fn test_missing_account_is_not_found() {
        let (storage, _temp) = test_storage();
        let result = storage.get_account(AccountId::generate());
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_accounts_for_owner_scoped_to_owner() {
        let (storage, _temp) = test_storage();
        let owner = UserId::generate();
        let other = UserId::generate();

        storage
            .commit(&WriteUnit {
                accounts: vec![
                    test_account(owner, "1111111111"),
                    test_account(owner, "2222222222"),
                    test_account(other, "3333333333"),
                ],
                ..Default::default()
            })
            .unwrap();

        let accounts = storage.accounts_for_owner(owner).unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(accounts.iter().all(|a| a.owner == owner));
    }

    #[test]
    fn test_commit_is_atomic_across_families() {
        let (storage, _temp) = test_storage();
        let account = test_account(UserId::generate(), "4444444444");
        let transaction = test_transaction(account.id, "TXNAAAABBBBCCCC", Utc::now());

        storage
            .commit(&WriteUnit {
                accounts: vec![account.clone()],
                transactions: vec![transaction.clone()],
                ..Default::default()
            })
            .unwrap();

        assert_eq!(storage.get_account(account.id).unwrap().id, account.id);
        assert_eq!(
            storage.get_transaction(transaction.id).unwrap().reference,
            transaction.reference
        );
        let by_reference = storage
            .find_transaction_by_reference(&transaction.reference)
            .unwrap()
            .unwrap();
        assert_eq!(by_reference.id, transaction.id);
    }

    #[test]
    fn test_transaction_history_newest_first() {
        let (storage, _temp) = test_storage();
        let account = test_account(UserId::generate(), "5555555555");
        let base = Utc::now();

        let older = test_transaction(account.id, "TXN000000000001", base);
        let newer = test_transaction(account.id, "TXN000000000002", base + Duration::seconds(5));

        storage
            .commit(&WriteUnit {
                accounts: vec![account.clone()],
                transactions: vec![older.clone(), newer.clone()],
                ..Default::default()
            })
            .unwrap();

        let history = storage.transactions_for_account(account.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, newer.id);
        assert_eq!(history[1].id, older.id);
    }

    #[test]
    fn test_out_of_range_timestamp_is_rejected() {
        let (storage, _temp) = test_storage();
        let account = test_account(UserId::generate(), "7777777777");

        // Past the nanosecond-precision horizon (~2262)
        let far_future = Utc.with_ymd_and_hms(2300, 1, 1, 0, 0, 0).unwrap();
        let transaction = test_transaction(account.id, "TXN000000000099", far_future);

        let result = storage.commit(&WriteUnit {
            accounts: vec![account.clone()],
            transactions: vec![transaction],
            ..Default::default()
        });
        assert!(matches!(result, Err(Error::Storage(_))));

        let range = storage.transactions_for_account_between(
            account.id,
            Utc::now(),
            Utc.with_ymd_and_hms(2300, 1, 1, 0, 0, 0).unwrap(),
        );
        assert!(matches!(range, Err(Error::Storage(_))));
    }

    #[test]
    fn test_transaction_history_date_range() {
        let (storage, _temp) = test_storage();
        let account = test_account(UserId::generate(), "6666666666");
        let base = Utc::now();

        let t1 = test_transaction(account.id, "TXN000000000011", base);
        let t2 = test_transaction(account.id, "TXN000000000012", base + Duration::hours(1));
        let t3 = test_transaction(account.id, "TXN000000000013", base + Duration::hours(2));

        storage
            .commit(&WriteUnit {
                accounts: vec![account.clone()],
                transactions: vec![t1, t2.clone(), t3],
                ..Default::default()
            })
            .unwrap();

        let window = storage
            .transactions_for_account_between(
                account.id,
                base + Duration::minutes(30),
                base + Duration::minutes(90),
            )
            .unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].id, t2.id);
    }
}
