//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Remain arithmetic: remain == points_before - amount on every success
//! - Rejection leaves state untouched: no row, no balance change
//! - Credit arithmetic: points_after == points_before + amount
//! - Non-idempotence: duplicate payloads produce duplicate ledger rows
//! - Sequential drains produce strictly decreasing remain snapshots
//! - Mixed donation/credit sequences conserve the balance equation

use points_ledger::{
    Config, DonationRequest, Error, Ledger, StreamId, TransactionRequest, User,
};
use proptest::prelude::*;
use tempfile::TempDir;

/// Open a ledger in a temp directory with a wide freshness window, so the
/// wall clock cannot make property runs flaky.
fn create_test_ledger() -> (Ledger, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    config.validation.freshness_window_ms = 60_000;
    (Ledger::open(config).unwrap(), temp_dir)
}

fn seed_donor(ledger: &Ledger, points: i64) -> (User, StreamId) {
    let donor = ledger.create_user("donor", "ada", points, false).unwrap();
    let creator = ledger.create_user("creator", "grace", 0, true).unwrap();
    let stream = ledger.create_stream(creator.id).unwrap();
    (donor, stream.id)
}

fn fresh_donation(donor: &User, amount: i64) -> DonationRequest {
    DonationRequest {
        donor_id: donor.id,
        amount,
        datetime: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        signature: None,
    }
}

/// Strategy: a balance and a donation amount that fits inside it
fn balance_and_amount() -> impl Strategy<Value = (i64, i64)> {
    (0i64..10_000).prop_flat_map(|points| (Just(points), 0..=points))
}

#[derive(Debug, Clone)]
enum Op {
    Donate(i64),
    Credit(i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1i64..100).prop_map(Op::Donate),
        (0i64..100).prop_map(Op::Credit),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: every successful donation snapshots the exact post-debit balance
    #[test]
    fn prop_donation_remain_arithmetic((points, amount) in balance_and_amount()) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger();
            let (donor, stream_id) = seed_donor(&ledger, points);

            let record = ledger
                .create_donation(stream_id, fresh_donation(&donor, amount))
                .await
                .unwrap();

            prop_assert_eq!(record.remain, points - amount);
            prop_assert_eq!(ledger.get_user(donor.id).unwrap().points, record.remain);
            Ok(())
        })?;
    }

    /// Property: an over-balance donation is rejected with untouched state
    #[test]
    fn prop_insufficient_balance_rejected(points in 0i64..1_000, excess in 1i64..1_000) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger();
            let (donor, stream_id) = seed_donor(&ledger, points);

            let err = ledger
                .create_donation(stream_id, fresh_donation(&donor, points + excess))
                .await
                .unwrap_err();

            prop_assert!(
                matches!(err, Error::InsufficientBalance { .. }),
                "expected InsufficientBalance, got {:?}",
                err
            );
            prop_assert_eq!(ledger.get_user(donor.id).unwrap().points, points);
            prop_assert!(ledger.list_donations(stream_id).await.unwrap().is_empty());
            Ok(())
        })?;
    }

    /// Property: a successful transaction credits exactly its amount
    #[test]
    fn prop_transaction_credit(
        points in 0i64..10_000,
        amount in 0i64..10_000,
        cost in 0.0f64..500.0,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger();
            let user = ledger.create_user("u", "ada", points, false).unwrap();

            let record = ledger
                .create_transaction(TransactionRequest {
                    user_id: user.id,
                    amount,
                    cost,
                    issued_at: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
                    signature: None,
                })
                .await
                .unwrap();

            prop_assert!(record.success);
            prop_assert_eq!(ledger.get_user(user.id).unwrap().points, points + amount);
            Ok(())
        })?;
    }

    /// Property: identical payloads are never deduplicated
    #[test]
    fn prop_duplicates_all_apply(
        amount in 0i64..200,
        repeats in 1usize..5,
        slack in 0i64..100,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let points = amount * repeats as i64 + slack;
            let (ledger, _temp) = create_test_ledger();
            let (donor, stream_id) = seed_donor(&ledger, points);

            let request = fresh_donation(&donor, amount);
            for _ in 0..repeats {
                ledger
                    .create_donation(stream_id, request.clone())
                    .await
                    .unwrap();
            }

            prop_assert_eq!(
                ledger.get_user(donor.id).unwrap().points,
                points - amount * repeats as i64
            );
            prop_assert_eq!(
                ledger.list_donations(stream_id).await.unwrap().len(),
                repeats
            );
            Ok(())
        })?;
    }

    /// Property: draining a balance one donation at a time yields strictly
    /// decreasing remain snapshots and ends at zero
    #[test]
    fn prop_sequential_drain(amounts in prop::collection::vec(1i64..100, 1..20)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let total: i64 = amounts.iter().sum();
            let (ledger, _temp) = create_test_ledger();
            let (donor, stream_id) = seed_donor(&ledger, total);

            for &amount in &amounts {
                ledger
                    .create_donation(stream_id, fresh_donation(&donor, amount))
                    .await
                    .unwrap();
            }

            prop_assert_eq!(ledger.get_user(donor.id).unwrap().points, 0);

            let rows = ledger.list_donations(stream_id).await.unwrap();
            let remains: Vec<i64> = rows.iter().map(|r| r.donation.remain).collect();
            prop_assert!(remains.windows(2).all(|w| w[0] > w[1]));
            prop_assert_eq!(remains.last().copied(), Some(0));
            Ok(())
        })?;
    }

    /// Property: any mix of donations and credits conserves the balance
    /// equation - final points equal the initial balance minus accepted
    /// debits plus credits, with over-balance donations rejected in place
    #[test]
    fn prop_mixed_ops_conserve_balance(
        initial in 0i64..500,
        ops in prop::collection::vec(op_strategy(), 1..30),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (ledger, _temp) = create_test_ledger();
            let (donor, stream_id) = seed_donor(&ledger, initial);

            let mut expected = initial;
            for op in &ops {
                match *op {
                    Op::Donate(amount) => {
                        let result = ledger
                            .create_donation(stream_id, fresh_donation(&donor, amount))
                            .await;
                        if amount <= expected {
                            expected -= amount;
                            prop_assert_eq!(result.unwrap().remain, expected);
                        } else {
                            let err = result.unwrap_err();
                            prop_assert!(
                                matches!(err, Error::InsufficientBalance { .. }),
                                "expected InsufficientBalance, got {:?}",
                                err
                            );
                        }
                    }
                    Op::Credit(amount) => {
                        ledger
                            .create_transaction(TransactionRequest {
                                user_id: donor.id,
                                amount,
                                cost: 0.0,
                                issued_at: chrono::Utc::now().timestamp_millis() as f64
                                    / 1000.0,
                                signature: None,
                            })
                            .await
                            .unwrap();
                        expected += amount;
                    }
                }
            }

            prop_assert_eq!(ledger.get_user(donor.id).unwrap().points, expected);
            Ok(())
        })?;
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use points_ledger::UserId;

    #[tokio::test]
    async fn test_full_donation_lifecycle() {
        let (ledger, _temp) = create_test_ledger();

        let donor = ledger.create_user("donor", "ada", 100, false).unwrap();
        let creator = ledger.create_user("creator", "grace", 0, true).unwrap();
        let stream = ledger.create_stream(creator.id).unwrap();

        // Two donations and a credit
        ledger
            .create_donation(stream.id, fresh_donation(&donor, 30))
            .await
            .unwrap();
        ledger
            .create_donation(stream.id, fresh_donation(&donor, 20))
            .await
            .unwrap();
        ledger
            .create_transaction(TransactionRequest {
                user_id: donor.id,
                amount: 5,
                cost: 0.99,
                issued_at: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
                signature: None,
            })
            .await
            .unwrap();

        // 100 - 30 - 20 + 5
        assert_eq!(ledger.get_user(donor.id).unwrap().points, 55);

        let donations = ledger.list_donations(stream.id).await.unwrap();
        assert_eq!(donations.len(), 2);
        assert_eq!(donations[0].donation.remain, 70);
        assert_eq!(donations[1].donation.remain, 50);
        assert!(donations
            .iter()
            .all(|row| row.donor_name.as_deref() == Some("ada")));

        let transactions = ledger.list_transactions(donor.id).await.unwrap();
        assert_eq!(transactions.len(), 1);
        assert!(transactions[0].success);

        let stats = ledger.stats().unwrap();
        assert_eq!(stats.total_streams, 1);
    }

    #[tokio::test]
    async fn test_default_window_rejects_old_requests() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        // Default 200ms reference window
        let ledger = Ledger::open(config).unwrap();

        let donor = ledger.create_user("donor", "ada", 100, false).unwrap();
        let creator = ledger.create_user("creator", "grace", 0, true).unwrap();
        let stream = ledger.create_stream(creator.id).unwrap();

        let mut request = fresh_donation(&donor, 10);
        request.datetime -= 120.0;

        let err = ledger
            .create_donation(stream.id, request)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StaleRequest(_)));
        assert_eq!(ledger.get_user(donor.id).unwrap().points, 100);
    }

    #[tokio::test]
    async fn test_unknown_donor_is_not_found() {
        let (ledger, _temp) = create_test_ledger();
        let creator = ledger.create_user("creator", "grace", 0, true).unwrap();
        let stream = ledger.create_stream(creator.id).unwrap();

        let err = ledger
            .create_donation(
                stream.id,
                DonationRequest {
                    donor_id: UserId::new(99),
                    amount: 10,
                    datetime: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
                    signature: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
