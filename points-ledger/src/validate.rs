//! Request validation: value ranges and timestamp freshness
//!
//! Referential checks (stream/user existence, balance sufficiency) live in
//! the mutator because they must run against store state under the donor's
//! lock; everything here is a pure function of the request and the server
//! clock, taken as an explicit argument so tests are deterministic.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};

/// Check a client-supplied timestamp against the freshness window
///
/// `claimed_secs` is the request's seconds-since-epoch timestamp. Accepts
/// exactly `0 <= now - claimed <= window`, both bounds inclusive: a request
/// stamped exactly at `now` passes, a request from the future or older than
/// the window is stale. Comparison is done at millisecond precision.
pub fn check_freshness(now: DateTime<Utc>, claimed_secs: f64, window_ms: u64) -> Result<()> {
    if !claimed_secs.is_finite() {
        return Err(Error::InvalidArgument(
            "request timestamp is not a finite number".to_string(),
        ));
    }

    let claimed_ms = (claimed_secs * 1000.0).round() as i64;
    let age_ms = now.timestamp_millis() - claimed_ms;

    if age_ms < 0 {
        return Err(Error::StaleRequest(format!(
            "request timestamp is {}ms in the future",
            -age_ms
        )));
    }
    if age_ms > window_ms as i64 {
        return Err(Error::StaleRequest(format!(
            "request is {}ms old, window is {}ms",
            age_ms, window_ms
        )));
    }

    Ok(())
}

/// Check that a point amount is a non-negative integer
pub fn check_amount(amount: i64) -> Result<()> {
    if amount < 0 {
        return Err(Error::InvalidArgument(format!(
            "amount must be non-negative, got {}",
            amount
        )));
    }
    Ok(())
}

/// Check that an external-currency cost is non-negative (rejects NaN)
pub fn check_cost(cost: f64) -> Result<()> {
    if cost.is_nan() || cost < 0.0 {
        return Err(Error::InvalidArgument(format!(
            "cost must be non-negative, got {}",
            cost
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW_MS: u64 = 200;

    fn secs(now: DateTime<Utc>, offset_ms: i64) -> f64 {
        (now.timestamp_millis() + offset_ms) as f64 / 1000.0
    }

    #[test]
    fn test_exactly_now_is_fresh() {
        let now = Utc::now();
        check_freshness(now, secs(now, 0), WINDOW_MS).unwrap();
    }

    #[test]
    fn test_exactly_window_old_is_fresh() {
        let now = Utc::now();
        check_freshness(now, secs(now, -200), WINDOW_MS).unwrap();
    }

    #[test]
    fn test_older_than_window_is_stale() {
        let now = Utc::now();
        let err = check_freshness(now, secs(now, -201), WINDOW_MS).unwrap_err();
        assert!(matches!(err, Error::StaleRequest(_)));
    }

    #[test]
    fn test_future_is_stale() {
        let now = Utc::now();
        let err = check_freshness(now, secs(now, 1), WINDOW_MS).unwrap_err();
        assert!(matches!(err, Error::StaleRequest(_)));
    }

    #[test]
    fn test_non_finite_timestamp_rejected() {
        let now = Utc::now();
        let err = check_freshness(now, f64::NAN, WINDOW_MS).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_amounts() {
        check_amount(0).unwrap();
        check_amount(30).unwrap();
        assert!(matches!(
            check_amount(-1).unwrap_err(),
            Error::InvalidArgument(_)
        ));
    }

    #[test]
    fn test_costs() {
        check_cost(0.0).unwrap();
        check_cost(9.99).unwrap();
        assert!(matches!(
            check_cost(-0.01).unwrap_err(),
            Error::InvalidArgument(_)
        ));
        assert!(matches!(
            check_cost(f64::NAN).unwrap_err(),
            Error::InvalidArgument(_)
        ));
    }
}
