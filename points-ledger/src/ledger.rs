//! Main ledger orchestration layer
//!
//! This module ties together the store, validator, and balance mutator into
//! the high-level API the request gateway consumes.
//!
//! Mutations run their storage I/O and per-user locking synchronously on
//! the calling task. Individual commits are a single small write batch, so
//! the facade does not offload them to a blocking pool; callers with
//! latency-sensitive runtimes can wrap calls in `spawn_blocking` themselves.
//!
//! # Example
//!
//! ```no_run
//! use points_ledger::{Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> points_ledger::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config)?;
//!
//!     // let record = ledger.create_donation(stream_id, request).await?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    error::{Error, Result},
    metrics::Metrics,
    mutator::Mutator,
    store::{Store, StoreStats},
    types::{
        DonationRecord, DonationRequest, DonationWithDonor, Stream, StreamId, TransactionRecord,
        TransactionRequest, User, UserId,
    },
    Config,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

/// Main ledger interface
pub struct Ledger {
    /// Persistent store
    store: Arc<Store>,

    /// Balance mutator (per-user write serialization)
    mutator: Mutator,

    /// Prometheus metrics
    metrics: Metrics,
}

impl Ledger {
    /// Open ledger with configuration
    pub fn open(config: Config) -> Result<Self> {
        let store = Arc::new(Store::open(&config)?);
        let mutator = Mutator::new(store.clone(), config.validation.freshness_window_ms);
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;

        Ok(Self {
            store,
            mutator,
            metrics,
        })
    }

    // Mutating operations

    /// Create a donation against a stream
    ///
    /// Validates the request (referential existence, range, balance,
    /// freshness), then atomically debits the donor and appends the ledger
    /// row. Returns the persisted record including its store-assigned id.
    pub async fn create_donation(
        &self,
        stream_id: StreamId,
        request: DonationRequest,
    ) -> Result<DonationRecord> {
        let start = Instant::now();
        let now = Utc::now();

        let result = self.mutator.apply_donation(stream_id, &request, now);
        self.metrics
            .record_apply_duration(start.elapsed().as_secs_f64());

        match &result {
            Ok(record) => {
                self.metrics.record_donation();
                tracing::info!(
                    donation_id = record.id,
                    stream_id = %stream_id,
                    donor_id = %record.donor_id,
                    amount = record.amount,
                    remain = record.remain,
                    "Donation accepted"
                );
            }
            Err(err) => {
                self.metrics.record_rejection();
                tracing::warn!(
                    stream_id = %stream_id,
                    donor_id = %request.donor_id,
                    error = %err,
                    "Donation rejected"
                );
            }
        }

        result
    }

    /// Create a transaction crediting a user
    pub async fn create_transaction(
        &self,
        request: TransactionRequest,
    ) -> Result<TransactionRecord> {
        let start = Instant::now();
        let now = Utc::now();

        let result = self.mutator.apply_transaction(&request, now);
        self.metrics
            .record_apply_duration(start.elapsed().as_secs_f64());

        match &result {
            Ok(record) => {
                self.metrics.record_transaction();
                tracing::info!(
                    transaction_id = record.id,
                    user_id = %record.user_id,
                    amount = record.amount,
                    "Transaction accepted"
                );
            }
            Err(err) => {
                self.metrics.record_rejection();
                tracing::warn!(
                    user_id = %request.user_id,
                    error = %err,
                    "Transaction rejected"
                );
            }
        }

        result
    }

    // Read service (side-effect-free, no freshness check)

    /// Donations for a stream in insertion order, joined with donor names
    ///
    /// A donor that no longer resolves yields `donor_name: None` rather than
    /// failing the read. An unknown stream is `NotFound`; a known stream
    /// with no donations yields an empty sequence.
    pub async fn list_donations(&self, stream_id: StreamId) -> Result<Vec<DonationWithDonor>> {
        self.store
            .get_stream(stream_id)?
            .ok_or_else(|| Error::NotFound(format!("stream {}", stream_id)))?;

        self.store
            .donations_by_stream(stream_id)?
            .into_iter()
            .map(|donation| {
                let donor_name = self
                    .store
                    .get_user(donation.donor_id)?
                    .map(|user| user.username);
                Ok(DonationWithDonor {
                    donation,
                    donor_name,
                })
            })
            .collect()
    }

    /// Transactions for a user in insertion order
    pub async fn list_transactions(&self, user_id: UserId) -> Result<Vec<TransactionRecord>> {
        self.store
            .get_user(user_id)?
            .ok_or_else(|| Error::NotFound(format!("user {}", user_id)))?;

        self.store.transactions_by_user(user_id)
    }

    // Seed/admin surface

    /// Create a user (seed/admin path; secrets must be unique)
    pub fn create_user(
        &self,
        secret: &str,
        username: &str,
        points: i64,
        can_stream: bool,
    ) -> Result<User> {
        if points < 0 {
            return Err(Error::InvalidArgument(format!(
                "starting points must be non-negative, got {}",
                points
            )));
        }
        self.store.insert_user(secret, username, points, can_stream)
    }

    /// Create a stream owned by `creator_id` (requires the `can_stream` capability)
    pub fn create_stream(&self, creator_id: UserId) -> Result<Stream> {
        let creator = self
            .store
            .get_user(creator_id)?
            .ok_or_else(|| Error::NotFound(format!("user {}", creator_id)))?;

        if !creator.can_stream {
            return Err(Error::InvalidArgument(format!(
                "user {} cannot own streams",
                creator_id
            )));
        }

        self.store.insert_stream(creator_id, Utc::now())
    }

    /// Look up a user by id
    pub fn get_user(&self, user_id: UserId) -> Result<User> {
        self.store
            .get_user(user_id)?
            .ok_or_else(|| Error::NotFound(format!("user {}", user_id)))
    }

    /// Storage statistics
    pub fn stats(&self) -> Result<StoreStats> {
        self.store.get_stats()
    }

    /// Metrics collector (for the exporter endpoint)
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
