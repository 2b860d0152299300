//! Storage layer using RocksDB
//!
//! One column family per logical table, plus a secondary-index family:
//!
//! - `users` - User rows (key: user_id)
//! - `streams` - Stream rows (key: stream_id)
//! - `donations` - Append-only donation ledger (key: donation_id)
//! - `transactions` - Append-only transaction ledger (key: transaction_id)
//! - `indices` - Secondary indices for fast lookups
//!
//! All keys are big-endian `u64`, so iteration order equals id order and the
//! highest existing id can be recovered from the last key at open time.
//! Balance updates commit in the same `WriteBatch` as their ledger row: a
//! concurrent reader never sees one without the other.

use crate::{
    error::{Error, Result},
    types::{DonationRecord, Stream, StreamId, TransactionRecord, User, UserId},
    Config,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Column family names
const CF_USERS: &str = "users";
const CF_STREAMS: &str = "streams";
const CF_DONATIONS: &str = "donations";
const CF_TRANSACTIONS: &str = "transactions";
const CF_INDICES: &str = "indices";

/// Index key tags (first byte of composite keys in `indices`)
const IDX_STREAM_DONATION: u8 = b'd';
const IDX_USER_TRANSACTION: u8 = b't';
const IDX_SECRET_USER: u8 = b's';

/// Storage wrapper for RocksDB
pub struct Store {
    db: Arc<DB>,

    // Id allocators, recovered from the last key of each family at open.
    next_user_id: AtomicU64,
    next_stream_id: AtomicU64,
    next_donation_id: AtomicU64,
    next_transaction_id: AtomicU64,

    // Serializes seed/admin inserts so the secret-uniqueness check and the
    // row write cannot interleave.
    admin_lock: Mutex<()>,
}

impl Store {
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
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_USERS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_STREAMS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_DONATIONS, Self::cf_options_ledger()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_ledger()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        let next_user_id = Self::recover_next_id(&db, CF_USERS)?;
        let next_stream_id = Self::recover_next_id(&db, CF_STREAMS)?;
        let next_donation_id = Self::recover_next_id(&db, CF_DONATIONS)?;
        let next_transaction_id = Self::recover_next_id(&db, CF_TRANSACTIONS)?;

        tracing::info!(
            path = %path.display(),
            next_user_id,
            next_donation_id,
            next_transaction_id,
            "Opened RocksDB store"
        );

        Ok(Self {
            db: Arc::new(db),
            next_user_id: AtomicU64::new(next_user_id),
            next_stream_id: AtomicU64::new(next_stream_id),
            next_donation_id: AtomicU64::new(next_donation_id),
            next_transaction_id: AtomicU64::new(next_transaction_id),
            admin_lock: Mutex::new(()),
        })
    }

    // Column family options

    fn cf_options_rows() -> Options {
        let mut opts = Options::default();
        // Rows are frequently read back, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_ledger() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Indices benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    // Helpers

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    /// Highest id in a family + 1, or 1 for an empty family
    fn recover_next_id(db: &DB, cf_name: &str) -> Result<u64> {
        let cf = db
            .cf_handle(cf_name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", cf_name)))?;

        let mut iter = db.iterator_cf(cf, IteratorMode::End);
        if let Some(item) = iter.next() {
            let (key, _) = item?;
            let id = decode_id(&key)?;
            return Ok(id + 1);
        }

        Ok(1)
    }

    // User operations

    /// Insert a new user row, enforcing secret uniqueness
    pub fn insert_user(
        &self,
        secret: &str,
        username: &str,
        points: i64,
        can_stream: bool,
    ) -> Result<User> {
        let _guard = self.admin_lock.lock();

        let cf_indices = self.cf_handle(CF_INDICES)?;
        let secret_key = index_key_secret(secret);
        if self.db.get_cf(cf_indices, &secret_key)?.is_some() {
            return Err(Error::InvalidArgument(
                "secret is already in use".to_string(),
            ));
        }

        let id = UserId::new(self.next_user_id.fetch_add(1, Ordering::SeqCst));
        let user = User {
            id,
            secret: secret.to_string(),
            active: true,
            points,
            username: username.to_string(),
            can_stream,
        };

        let cf_users = self.cf_handle(CF_USERS)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(cf_users, encode_id(id.get()), bincode::serialize(&user)?);
        batch.put_cf(cf_indices, &secret_key, encode_id(id.get()));
        self.db.write(batch)?;

        tracing::debug!(user_id = %user.id, "User created");
        Ok(user)
    }

    /// Overwrite a user row in place (seed/admin path)
    pub(crate) fn put_user(&self, user: &User) -> Result<()> {
        let cf = self.cf_handle(CF_USERS)?;
        self.db
            .put_cf(cf, encode_id(user.id.get()), bincode::serialize(user)?)?;
        Ok(())
    }

    /// Get user by id
    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let cf = self.cf_handle(CF_USERS)?;
        match self.db.get_cf(cf, encode_id(id.get()))? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Remove a user row (test support for dangling-donor reads)
    #[cfg(test)]
    pub(crate) fn remove_user(&self, id: UserId) -> Result<()> {
        let cf = self.cf_handle(CF_USERS)?;
        self.db.delete_cf(cf, encode_id(id.get()))?;
        Ok(())
    }

    // Stream operations

    /// Insert a new stream row
    pub fn insert_stream(&self, creator_id: UserId, created_at: DateTime<Utc>) -> Result<Stream> {
        let _guard = self.admin_lock.lock();

        let id = StreamId::new(self.next_stream_id.fetch_add(1, Ordering::SeqCst));
        let stream = Stream {
            id,
            creator_id,
            created_at,
        };

        let cf = self.cf_handle(CF_STREAMS)?;
        self.db
            .put_cf(cf, encode_id(id.get()), bincode::serialize(&stream)?)?;

        tracing::debug!(stream_id = %stream.id, creator_id = %creator_id, "Stream created");
        Ok(stream)
    }

    /// Get stream by id
    pub fn get_stream(&self, id: StreamId) -> Result<Option<Stream>> {
        let cf = self.cf_handle(CF_STREAMS)?;
        match self.db.get_cf(cf, encode_id(id.get()))? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    // Ledger commits (atomic)

    /// Commit a donation: debited user row + ledger row + index, one batch
    ///
    /// `donor` must already carry the debited balance; the new row's `remain`
    /// snapshots it. Both writes land atomically or not at all.
    pub fn commit_donation(
        &self,
        donor: &User,
        stream_id: StreamId,
        amount: i64,
        created_at: DateTime<Utc>,
    ) -> Result<DonationRecord> {
        let id = self.next_donation_id.fetch_add(1, Ordering::SeqCst);
        let record = DonationRecord {
            id,
            stream_id,
            amount,
            remain: donor.points,
            donor_id: donor.id,
            created_at,
        };

        let cf_users = self.cf_handle(CF_USERS)?;
        let cf_donations = self.cf_handle(CF_DONATIONS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_users, encode_id(donor.id.get()), bincode::serialize(donor)?);
        batch.put_cf(cf_donations, encode_id(id), bincode::serialize(&record)?);
        batch.put_cf(
            cf_indices,
            index_key_stream_donation(stream_id, Some(id)),
            b"",
        );
        self.db.write(batch)?;

        tracing::debug!(
            donation_id = record.id,
            stream_id = %record.stream_id,
            donor_id = %record.donor_id,
            amount = record.amount,
            remain = record.remain,
            "Donation committed"
        );

        Ok(record)
    }

    /// Commit a transaction: credited user row + ledger row + index, one batch
    pub fn commit_transaction(
        &self,
        user: &User,
        amount: i64,
        cost: f64,
        issued_at: DateTime<Utc>,
    ) -> Result<TransactionRecord> {
        let id = self.next_transaction_id.fetch_add(1, Ordering::SeqCst);
        let record = TransactionRecord {
            id,
            success: true,
            amount,
            cost,
            user_id: user.id,
            issued_at,
        };

        let cf_users = self.cf_handle(CF_USERS)?;
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(cf_users, encode_id(user.id.get()), bincode::serialize(user)?);
        batch.put_cf(cf_transactions, encode_id(id), bincode::serialize(&record)?);
        batch.put_cf(
            cf_indices,
            index_key_user_transaction(user.id, Some(id)),
            b"",
        );
        self.db.write(batch)?;

        tracing::debug!(
            transaction_id = record.id,
            user_id = %record.user_id,
            amount = record.amount,
            "Transaction committed"
        );

        Ok(record)
    }

    // Read-side queries

    /// Donations for a stream, in insertion (id) order
    pub fn donations_by_stream(&self, stream_id: StreamId) -> Result<Vec<DonationRecord>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let cf_donations = self.cf_handle(CF_DONATIONS)?;

        let prefix = index_key_stream_donation(stream_id, None);
        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&prefix, Direction::Forward));

        let mut records = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            // Tail of the index key is the donation id
            let donation_id = decode_id(&key[prefix.len()..])?;
            let value = self
                .db
                .get_cf(cf_donations, encode_id(donation_id))?
                .ok_or_else(|| {
                    Error::Storage(format!("Index points at missing donation {}", donation_id))
                })?;
            records.push(bincode::deserialize(&value)?);
        }

        Ok(records)
    }

    /// Transactions for a user, in insertion (id) order
    pub fn transactions_by_user(&self, user_id: UserId) -> Result<Vec<TransactionRecord>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;

        let prefix = index_key_user_transaction(user_id, None);
        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&prefix, Direction::Forward));

        let mut records = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            let transaction_id = decode_id(&key[prefix.len()..])?;
            let value = self
                .db
                .get_cf(cf_transactions, encode_id(transaction_id))?
                .ok_or_else(|| {
                    Error::Storage(format!(
                        "Index points at missing transaction {}",
                        transaction_id
                    ))
                })?;
            records.push(bincode::deserialize(&value)?);
        }

        Ok(records)
    }

    // Statistics

    /// Get storage statistics (approximate, fast)
    pub fn get_stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            total_users: self.approximate_count(CF_USERS)?,
            total_streams: self.approximate_count(CF_STREAMS)?,
            total_donations: self.approximate_count(CF_DONATIONS)?,
            total_transactions: self.approximate_count(CF_TRANSACTIONS)?,
        })
    }

    fn approximate_count(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf_handle(cf_name)?;
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(prop)
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StoreStats {
    /// Users in the store
    pub total_users: u64,
    /// Streams in the store
    pub total_streams: u64,
    /// Donation ledger rows
    pub total_donations: u64,
    /// Transaction ledger rows
    pub total_transactions: u64,
}

// Key encoding helpers

fn encode_id(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn decode_id(bytes: &[u8]) -> Result<u64> {
    let arr: [u8; 8] = bytes
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::Storage("Malformed id key".to_string()))?;
    Ok(u64::from_be_bytes(arr))
}

fn index_key_secret(secret: &str) -> Vec<u8> {
    let mut key = vec![IDX_SECRET_USER];
    key.extend_from_slice(secret.as_bytes());
    key
}

fn index_key_stream_donation(stream_id: StreamId, donation_id: Option<u64>) -> Vec<u8> {
    let mut key = vec![IDX_STREAM_DONATION];
    key.extend_from_slice(&stream_id.get().to_be_bytes());
    if let Some(id) = donation_id {
        key.extend_from_slice(&id.to_be_bytes());
    }
    key
}

fn index_key_user_transaction(user_id: UserId, transaction_id: Option<u64>) -> Vec<u8> {
    let mut key = vec![IDX_USER_TRANSACTION];
    key.extend_from_slice(&user_id.get().to_be_bytes());
    if let Some(id) = transaction_id {
        key.extend_from_slice(&id.to_be_bytes());
    }
    key
}
