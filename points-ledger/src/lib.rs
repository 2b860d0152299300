//! Points Ledger Core
//!
//! Donation/points ledger: users hold an integer points balance, donations
//! debit a donor and credit a stream, transactions credit a user and record
//! an external-currency cost.
//!
//! # Architecture
//!
//! - **Append-only ledger**: donation and transaction rows are immutable
//! - **Atomic mutation**: balance update and ledger insert commit together
//! - **Per-user serialization**: same-user mutations never interleave,
//!   different users proceed in parallel
//! - **Freshness window**: requests outside the window are rejected before
//!   any mutation is attempted
//!
//! The HTTP gateway consuming this crate is a separate concern; this crate
//! owns validation, mutation, and reads.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod mutator;
pub mod store;
pub mod types;
pub mod validate;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use types::{
    DonationRecord, DonationRequest, DonationWithDonor, Stream, StreamId, TransactionRecord,
    TransactionRequest, User, UserId,
};
