//! Metrics collection for observability
//!
//! Prometheus metrics for monitoring the ledger core:
//!
//! - `ledger_donations_total` - Donations committed
//! - `ledger_transactions_total` - Transactions committed
//! - `ledger_rejected_requests_total` - Requests rejected by validation
//! - `ledger_apply_duration_seconds` - Histogram of mutation latencies

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Donations committed
    pub donations_total: IntCounter,

    /// Transactions committed
    pub transactions_total: IntCounter,

    /// Requests rejected before mutation
    pub rejected_requests_total: IntCounter,

    /// Mutation latency histogram
    pub apply_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let donations_total = IntCounter::with_opts(Opts::new(
            "ledger_donations_total",
            "Donations committed",
        ))?;
        registry.register(Box::new(donations_total.clone()))?;

        let transactions_total = IntCounter::with_opts(Opts::new(
            "ledger_transactions_total",
            "Transactions committed",
        ))?;
        registry.register(Box::new(transactions_total.clone()))?;

        let rejected_requests_total = IntCounter::with_opts(Opts::new(
            "ledger_rejected_requests_total",
            "Requests rejected by validation",
        ))?;
        registry.register(Box::new(rejected_requests_total.clone()))?;

        let apply_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_apply_duration_seconds",
                "Histogram of mutation latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(apply_duration.clone()))?;

        Ok(Self {
            donations_total,
            transactions_total,
            rejected_requests_total,
            apply_duration,
            registry,
        })
    }

    /// Record a committed donation
    pub fn record_donation(&self) {
        self.donations_total.inc();
    }

    /// Record a committed transaction
    pub fn record_transaction(&self) {
        self.transactions_total.inc();
    }

    /// Record a rejected request
    pub fn record_rejection(&self) {
        self.rejected_requests_total.inc();
    }

    /// Record a mutation latency
    pub fn record_apply_duration(&self, duration_seconds: f64) {
        self.apply_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
