//! Balance mutator: the atomic effect of a validated request
//!
//! The user row is a shared mutable resource: all mutations against the
//! same user serialize on a per-user lock, so the read-check-write of the
//! balance plus the ledger insert is effectively atomic per user. Mutations
//! against different users proceed fully in parallel; there is no global
//! writer lock. No retries: a failed mutation is reported to the caller.

use crate::{
    error::{Error, Result},
    store::Store,
    types::{DonationRecord, DonationRequest, StreamId, TransactionRecord, TransactionRequest},
    validate,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Performs atomic balance + ledger mutations against the store
pub struct Mutator {
    store: Arc<Store>,

    /// Per-user serialization points, created on first touch and dropped
    /// again once no in-flight request holds them
    user_locks: DashMap<u64, Arc<Mutex<()>>>,

    /// Freshness window (milliseconds)
    freshness_window_ms: u64,
}

impl Mutator {
    /// Create a mutator over the given store
    pub fn new(store: Arc<Store>, freshness_window_ms: u64) -> Self {
        Self {
            store,
            user_locks: DashMap::new(),
            freshness_window_ms,
        }
    }

    fn user_lock(&self, user_id: u64) -> Arc<Mutex<()>> {
        self.user_locks.entry(user_id).or_default().clone()
    }

    /// Drop the user's lock entry once only the table itself holds it.
    ///
    /// The check and removal run under the shard lock, and so does the
    /// clone in `user_lock`, so a concurrent request either keeps the
    /// entry alive (strong count > 1) or recreates it after removal.
    /// Keeps the table bounded by the number of in-flight users.
    fn release_user_lock(&self, user_id: u64) {
        self.user_locks
            .remove_if(&user_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Apply a donation: debit the donor, append the ledger row
    ///
    /// Checks run in order and the first failure wins: stream existence,
    /// donor existence and activity, amount range, balance sufficiency,
    /// freshness. `now` is the server clock captured at request entry; it is
    /// used for both the freshness check and the row's `created_at`.
    pub fn apply_donation(
        &self,
        stream_id: StreamId,
        request: &DonationRequest,
        now: DateTime<Utc>,
    ) -> Result<DonationRecord> {
        let lock = self.user_lock(request.donor_id.get());
        let result = {
            let _guard = lock.lock();
            self.donate_locked(stream_id, request, now)
        };
        drop(lock);
        self.release_user_lock(request.donor_id.get());
        result
    }

    fn donate_locked(
        &self,
        stream_id: StreamId,
        request: &DonationRequest,
        now: DateTime<Utc>,
    ) -> Result<DonationRecord> {
        self.store
            .get_stream(stream_id)?
            .ok_or_else(|| Error::NotFound(format!("stream {}", stream_id)))?;

        let mut donor = self
            .store
            .get_user(request.donor_id)?
            .filter(|u| u.active)
            .ok_or_else(|| Error::NotFound(format!("active user {}", request.donor_id)))?;

        validate::check_amount(request.amount)?;

        if donor.points < request.amount {
            return Err(Error::InsufficientBalance {
                points: donor.points,
                amount: request.amount,
            });
        }

        validate::check_freshness(now, request.datetime, self.freshness_window_ms)?;

        // Compute remain, then persist balance and row together.
        donor.points -= request.amount;
        self.store
            .commit_donation(&donor, stream_id, request.amount, now)
    }

    /// Apply a transaction: credit the user, append the ledger row
    ///
    /// No balance-sufficiency check; transactions credit in this core. A
    /// credit that would overflow the balance is rejected before any write.
    pub fn apply_transaction(
        &self,
        request: &TransactionRequest,
        now: DateTime<Utc>,
    ) -> Result<TransactionRecord> {
        let lock = self.user_lock(request.user_id.get());
        let result = {
            let _guard = lock.lock();
            self.credit_locked(request, now)
        };
        drop(lock);
        self.release_user_lock(request.user_id.get());
        result
    }

    fn credit_locked(
        &self,
        request: &TransactionRequest,
        now: DateTime<Utc>,
    ) -> Result<TransactionRecord> {
        let mut user = self
            .store
            .get_user(request.user_id)?
            .ok_or_else(|| Error::NotFound(format!("user {}", request.user_id)))?;

        validate::check_amount(request.amount)?;
        validate::check_cost(request.cost)?;
        validate::check_freshness(now, request.issued_at, self.freshness_window_ms)?;

        user.points = user.points.checked_add(request.amount).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "crediting {} to balance {} overflows",
                request.amount, user.points
            ))
        })?;
        self.store
            .commit_transaction(&user, request.amount, request.cost, now)
    }
}
