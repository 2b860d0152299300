//! Core types for the points ledger
//!
//! All persisted types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Integral point arithmetic (no fractional points)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// User identifier (store-assigned, monotonically increasing)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(u64);

impl UserId {
    /// Create from raw id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get raw id
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stream identifier (store-assigned, monotonically increasing)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(u64);

impl StreamId {
    /// Create from raw id
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get raw id
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Application user holding a points balance
///
/// Created through the seed/admin surface and mutated only by the balance
/// mutator. `points` never goes negative as a result of a donation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Store-assigned identifier
    pub id: UserId,

    /// Opaque identity token (unique, never verified cryptographically here)
    pub secret: String,

    /// Inactive users cannot donate
    pub active: bool,

    /// Current points balance (>= 0 after every donation)
    pub points: i64,

    /// Display name
    pub username: String,

    /// Whether this user may own streams
    pub can_stream: bool,
}

/// A stream that donations are credited to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stream {
    /// Store-assigned identifier
    pub id: StreamId,

    /// Owning user (must hold `can_stream`)
    pub creator_id: UserId,

    /// Creation timestamp (server clock)
    pub created_at: DateTime<Utc>,
}

/// Immutable donation ledger row
///
/// `remain` is a point-in-time audit snapshot: the donor's balance
/// immediately after this specific mutation, not a live balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationRecord {
    /// Store-assigned identifier (monotonically increasing)
    pub id: u64,

    /// Stream the donation was credited to
    pub stream_id: StreamId,

    /// Points debited from the donor
    pub amount: i64,

    /// Donor balance snapshot after this mutation
    pub remain: i64,

    /// Donating user
    pub donor_id: UserId,

    /// Commit timestamp (server clock)
    pub created_at: DateTime<Utc>,
}

/// Immutable transaction ledger row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Store-assigned identifier (monotonically increasing)
    pub id: u64,

    /// Outcome flag (always true on the success path)
    pub success: bool,

    /// Points credited to the user
    pub amount: i64,

    /// External-currency cost associated with the amount
    pub cost: f64,

    /// Credited user
    pub user_id: UserId,

    /// Commit timestamp (server clock)
    pub issued_at: DateTime<Utc>,
}

/// Donation request payload as delivered by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonationRequest {
    /// Donating user
    pub donor_id: UserId,

    /// Points to debit
    pub amount: i64,

    /// Client-supplied request timestamp (seconds since epoch)
    pub datetime: f64,

    /// Carried opaquely; never verified here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Transaction request payload as delivered by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRequest {
    /// Credited user
    pub user_id: UserId,

    /// Points to credit
    pub amount: i64,

    /// External-currency cost
    pub cost: f64,

    /// Client-supplied request timestamp (seconds since epoch)
    pub issued_at: f64,

    /// Carried opaquely; never verified here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Donation row joined with the donor's display name for presentation
///
/// `donor_name` is `None` when the donor row cannot be resolved; a missing
/// donor never fails the whole read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonationWithDonor {
    /// The ledger row
    #[serde(flatten)]
    pub donation: DonationRecord,

    /// Donor display name, if the donor still resolves
    pub donor_name: Option<String>,
}
