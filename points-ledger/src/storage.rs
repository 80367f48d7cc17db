//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `users` - Registered users (key: user_id)
//! - `accounts` - Reward accounts (key: user_id)
//! - `transactions` - Append-only point transactions (key: user_id || txn_id)
//! - `reports` - Waste reports (key: report_id)
//! - `collected_wastes` - Collection records (key: id)
//! - `catalog` - Redeemable reward catalog (key: entry_id)
//! - `notifications` - User notifications (key: user_id || notification_id)
//! - `indices` - Secondary indices (email -> user_id)
//! - `meta` - Monotonic id counters
//!
//! Transactions and notifications are keyed by `user_id || id` with
//! big-endian encoding, so a forward scan over a user prefix yields append
//! order and a full scan yields every row. Multi-row mutations (balance
//! update + transaction append) go through a single `WriteBatch` so they
//! commit or fail as one unit.

use crate::{
    error::{Error, Result},
    types::{
        CatalogEntry, CollectedWaste, Notification, Report, RewardAccount, Transaction, User,
    },
    Config,
};
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Column family names
const CF_USERS: &str = "users";
const CF_ACCOUNTS: &str = "accounts";
const CF_TRANSACTIONS: &str = "transactions";
const CF_REPORTS: &str = "reports";
const CF_COLLECTED: &str = "collected_wastes";
const CF_CATALOG: &str = "catalog";
const CF_NOTIFICATIONS: &str = "notifications";
const CF_INDICES: &str = "indices";
const CF_META: &str = "meta";

/// Id counter names in the meta column family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdCounter {
    /// Users table
    User,
    /// Transactions table
    Transaction,
    /// Reports table
    Report,
    /// Collected wastes table
    Collected,
    /// Catalog table
    Catalog,
    /// Notifications table
    Notification,
}

impl IdCounter {
    fn key(&self) -> &'static [u8] {
        match self {
            IdCounter::User => b"next_user_id",
            IdCounter::Transaction => b"next_transaction_id",
            IdCounter::Report => b"next_report_id",
            IdCounter::Collected => b"next_collected_id",
            IdCounter::Catalog => b"next_catalog_id",
            IdCounter::Notification => b"next_notification_id",
        }
    }
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,

    /// Cached next-id per counter, persisted to the meta CF on allocation.
    /// Allocation happens only on the single writer task; the mutex just
    /// gives interior mutability behind `&self`.
    next_ids: Mutex<HashMap<IdCounter, u64>>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for the append-heavy transaction log
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_USERS, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_REPORTS, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_COLLECTED, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_CATALOG, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_NOTIFICATIONS, Self::cf_options_state()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_META, Self::cf_options_state()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB");

        Ok(Self {
            db: Arc::new(db),
            next_ids: Mutex::new(HashMap::new()),
        })
    }

    // Column family options

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_state() -> Options {
        let mut opts = Options::default();
        // Frequently read, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Key helpers

    fn key_u64(id: u64) -> [u8; 8] {
        id.to_be_bytes()
    }

    fn key_pair(a: u64, b: u64) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&a.to_be_bytes());
        key[8..].copy_from_slice(&b.to_be_bytes());
        key
    }

    fn email_index_key(email: &str) -> Vec<u8> {
        let mut key = b"email|".to_vec();
        key.extend_from_slice(email.as_bytes());
        key
    }

    // Id allocation

    /// Allocate the next surrogate id for a table.
    ///
    /// Catalog ids start at 1; id 0 is reserved for the synthetic
    /// "all points" entry.
    pub fn allocate_id(&self, counter: IdCounter) -> Result<u64> {
        let mut cache = self.next_ids.lock();

        let next = match cache.get(&counter) {
            Some(n) => *n,
            None => {
                let cf = self.cf_handle(CF_META)?;
                match self.db.get_cf(cf, counter.key())? {
                    Some(bytes) => {
                        let arr: [u8; 8] = bytes
                            .as_slice()
                            .try_into()
                            .map_err(|_| Error::Storage("Corrupt id counter".to_string()))?;
                        u64::from_be_bytes(arr)
                    }
                    None => 1,
                }
            }
        };

        let cf = self.cf_handle(CF_META)?;
        self.db.put_cf(cf, counter.key(), Self::key_u64(next + 1))?;
        cache.insert(counter, next + 1);

        Ok(next)
    }

    // User operations

    /// Insert a user and its email index; optionally seed its reward
    /// account and a bonus transaction (organization sign-up) atomically.
    pub fn put_user_atomic(
        &self,
        user: &User,
        seed: Option<(&RewardAccount, &Transaction)>,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_users = self.cf_handle(CF_USERS)?;
        batch.put_cf(cf_users, Self::key_u64(user.id), bincode::serialize(user)?);

        let cf_indices = self.cf_handle(CF_INDICES)?;
        batch.put_cf(
            cf_indices,
            Self::email_index_key(&user.email),
            Self::key_u64(user.id),
        );

        if let Some((account, txn)) = seed {
            let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
            batch.put_cf(
                cf_accounts,
                Self::key_u64(account.user_id),
                bincode::serialize(account)?,
            );

            let cf_txns = self.cf_handle(CF_TRANSACTIONS)?;
            batch.put_cf(
                cf_txns,
                Self::key_pair(txn.user_id, txn.id),
                bincode::serialize(txn)?,
            );
        }

        self.db.write(batch)?;

        tracing::debug!(user_id = user.id, email = %user.email, "User stored");

        Ok(())
    }

    /// Get user by id
    pub fn get_user(&self, user_id: u64) -> Result<User> {
        let cf = self.cf_handle(CF_USERS)?;
        let value = self
            .db
            .get_cf(cf, Self::key_u64(user_id))?
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Look up a user by email
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let Some(id_bytes) = self.db.get_cf(cf_indices, Self::email_index_key(email))? else {
            return Ok(None);
        };

        let arr: [u8; 8] = id_bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::Storage("Corrupt email index".to_string()))?;

        Ok(Some(self.get_user(u64::from_be_bytes(arr))?))
    }

    /// All users, ordered by id
    pub fn users(&self) -> Result<Vec<User>> {
        self.scan_all(CF_USERS)
    }

    // Account operations

    /// Get account for user, if one exists
    pub fn get_account(&self, user_id: u64) -> Result<Option<RewardAccount>> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        match self.db.get_cf(cf, Self::key_u64(user_id))? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Put account (single, unbatched)
    pub fn put_account(&self, account: &RewardAccount) -> Result<()> {
        let cf = self.cf_handle(CF_ACCOUNTS)?;
        self.db.put_cf(
            cf,
            Self::key_u64(account.user_id),
            bincode::serialize(account)?,
        )?;
        Ok(())
    }

    /// Apply a balance mutation: updated account, its paired transaction and
    /// an optional notification, committed as one batch.
    pub fn apply_account_mutation(
        &self,
        account: &RewardAccount,
        txn: &Transaction,
        notification: Option<&Notification>,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.batch_account_mutation(&mut batch, account, txn, notification)?;
        self.db.write(batch)?;

        tracing::debug!(
            user_id = account.user_id,
            txn_id = txn.id,
            kind = %txn.kind,
            amount = txn.amount,
            balance = account.balance,
            "Transaction applied"
        );

        Ok(())
    }

    /// Submit a report: report row plus the point consumption, atomic.
    pub fn apply_report_submission(
        &self,
        report: &Report,
        account: &RewardAccount,
        txn: &Transaction,
        notification: &Notification,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_reports = self.cf_handle(CF_REPORTS)?;
        batch.put_cf(
            cf_reports,
            Self::key_u64(report.id),
            bincode::serialize(report)?,
        );

        self.batch_account_mutation(&mut batch, account, txn, Some(notification))?;
        self.db.write(batch)?;

        tracing::debug!(
            report_id = report.id,
            user_id = report.user_id,
            balance = account.balance,
            "Report submitted"
        );

        Ok(())
    }

    /// Collect a report: status change, collection record and the
    /// collector's earning, atomic.
    pub fn apply_collection(
        &self,
        report: &Report,
        collected: &CollectedWaste,
        account: &RewardAccount,
        txn: &Transaction,
        notification: Option<&Notification>,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_reports = self.cf_handle(CF_REPORTS)?;
        batch.put_cf(
            cf_reports,
            Self::key_u64(report.id),
            bincode::serialize(report)?,
        );

        let cf_collected = self.cf_handle(CF_COLLECTED)?;
        batch.put_cf(
            cf_collected,
            Self::key_u64(collected.id),
            bincode::serialize(collected)?,
        );

        self.batch_account_mutation(&mut batch, account, txn, notification)?;
        self.db.write(batch)?;

        tracing::debug!(
            report_id = report.id,
            collector_id = collected.collector_id,
            amount = txn.amount,
            "Collection recorded"
        );

        Ok(())
    }

    fn batch_account_mutation(
        &self,
        batch: &mut WriteBatch,
        account: &RewardAccount,
        txn: &Transaction,
        notification: Option<&Notification>,
    ) -> Result<()> {
        let cf_accounts = self.cf_handle(CF_ACCOUNTS)?;
        batch.put_cf(
            cf_accounts,
            Self::key_u64(account.user_id),
            bincode::serialize(account)?,
        );

        let cf_txns = self.cf_handle(CF_TRANSACTIONS)?;
        batch.put_cf(
            cf_txns,
            Self::key_pair(txn.user_id, txn.id),
            bincode::serialize(txn)?,
        );

        if let Some(notification) = notification {
            let cf_notifs = self.cf_handle(CF_NOTIFICATIONS)?;
            batch.put_cf(
                cf_notifs,
                Self::key_pair(notification.user_id, notification.id),
                bincode::serialize(notification)?,
            );
        }

        Ok(())
    }

    // Transaction operations

    /// All transactions for a user, in append order
    pub fn user_transactions(&self, user_id: u64) -> Result<Vec<Transaction>> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        let prefix = Self::key_u64(user_id);

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut txns = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            txns.push(bincode::deserialize(&value)?);
        }

        Ok(txns)
    }

    /// Every transaction in the ledger, in key order
    pub fn all_transactions(&self) -> Result<Vec<Transaction>> {
        self.scan_all(CF_TRANSACTIONS)
    }

    // Report operations

    /// Get report by id
    pub fn get_report(&self, report_id: u64) -> Result<Report> {
        let cf = self.cf_handle(CF_REPORTS)?;
        let value = self
            .db
            .get_cf(cf, Self::key_u64(report_id))?
            .ok_or(Error::ReportNotFound(report_id))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Put report (status transitions)
    pub fn put_report(&self, report: &Report) -> Result<()> {
        let cf = self.cf_handle(CF_REPORTS)?;
        self.db.put_cf(
            cf,
            Self::key_u64(report.id),
            bincode::serialize(report)?,
        )?;
        Ok(())
    }

    /// All reports, ordered by id (submission order)
    pub fn reports(&self) -> Result<Vec<Report>> {
        self.scan_all(CF_REPORTS)
    }

    /// All collection records, ordered by id
    pub fn collected_wastes(&self) -> Result<Vec<CollectedWaste>> {
        self.scan_all(CF_COLLECTED)
    }

    // Catalog operations

    /// Get catalog entry by id
    pub fn get_catalog_entry(&self, entry_id: u64) -> Result<CatalogEntry> {
        let cf = self.cf_handle(CF_CATALOG)?;
        let value = self
            .db
            .get_cf(cf, Self::key_u64(entry_id))?
            .ok_or(Error::CatalogEntryNotFound(entry_id))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Put catalog entry
    pub fn put_catalog_entry(&self, entry: &CatalogEntry) -> Result<()> {
        let cf = self.cf_handle(CF_CATALOG)?;
        self.db
            .put_cf(cf, Self::key_u64(entry.id), bincode::serialize(entry)?)?;
        Ok(())
    }

    /// All catalog entries, ordered by id
    pub fn catalog_entries(&self) -> Result<Vec<CatalogEntry>> {
        self.scan_all(CF_CATALOG)
    }

    // Notification operations

    /// Get one notification
    pub fn get_notification(&self, user_id: u64, notification_id: u64) -> Result<Notification> {
        let cf = self.cf_handle(CF_NOTIFICATIONS)?;
        let value = self
            .db
            .get_cf(cf, Self::key_pair(user_id, notification_id))?
            .ok_or(Error::NotificationNotFound(notification_id))?;
        Ok(bincode::deserialize(&value)?)
    }

    /// Put notification (single, unbatched)
    pub fn put_notification(&self, notification: &Notification) -> Result<()> {
        let cf = self.cf_handle(CF_NOTIFICATIONS)?;
        self.db.put_cf(
            cf,
            Self::key_pair(notification.user_id, notification.id),
            bincode::serialize(notification)?,
        )?;
        Ok(())
    }

    /// All notifications for a user, in append order
    pub fn user_notifications(&self, user_id: u64) -> Result<Vec<Notification>> {
        let cf = self.cf_handle(CF_NOTIFICATIONS)?;
        let prefix = Self::key_u64(user_id);

        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(&prefix, Direction::Forward));

        let mut notifications = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            notifications.push(bincode::deserialize(&value)?);
        }

        Ok(notifications)
    }

    // Helpers

    fn scan_all<T: serde::de::DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf_handle(cf_name)?;
        let iter = self.db.iterator_cf(cf, IteratorMode::Start);

        let mut rows = Vec::new();
        for item in iter {
            let (_, value) = item?;
            rows.push(bincode::deserialize(&value)?);
        }

        Ok(rows)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}
