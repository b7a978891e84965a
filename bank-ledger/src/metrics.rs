//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `bank_accounts_opened_total` - Accounts opened
//! - `bank_accounts_closed_total` - Accounts closed
//! - `bank_deposits_total` - Deposits completed
//! - `bank_withdrawals_total` - Withdrawals completed
//! - `bank_transfers_total` - External transfers completed
//! - `bank_internal_transfers_total` - Internal transfers completed
//! - `bank_cards_issued_total` - Cards issued
//! - `bank_rejected_operations_total` - Operations rejected by validation
//! - `bank_operation_duration_seconds` - Histogram of mutation latencies
//!
//! Each instance carries its own registry so multiple ledgers can coexist
//! in one process (and in one test binary).

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Accounts opened
    pub accounts_opened_total: IntCounter,

    /// Accounts closed
    pub accounts_closed_total: IntCounter,

    /// Deposits completed
    pub deposits_total: IntCounter,

    /// Withdrawals completed
    pub withdrawals_total: IntCounter,

    /// External transfers completed
    pub transfers_total: IntCounter,

    /// Internal transfers completed
    pub internal_transfers_total: IntCounter,

    /// Cards issued
    pub cards_issued_total: IntCounter,

    /// Operations rejected by validation
    pub rejected_operations_total: IntCounter,

    /// Mutation latency histogram
    pub operation_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let accounts_opened_total = int_counter(
            &registry,
            "bank_accounts_opened_total",
            "Accounts opened",
        )?;
        let accounts_closed_total = int_counter(
            &registry,
            "bank_accounts_closed_total",
            "Accounts closed",
        )?;
        let deposits_total =
            int_counter(&registry, "bank_deposits_total", "Deposits completed")?;
        let withdrawals_total = int_counter(
            &registry,
            "bank_withdrawals_total",
            "Withdrawals completed",
        )?;
        let transfers_total = int_counter(
            &registry,
            "bank_transfers_total",
            "External transfers completed",
        )?;
        let internal_transfers_total = int_counter(
            &registry,
            "bank_internal_transfers_total",
            "Internal transfers completed",
        )?;
        let cards_issued_total =
            int_counter(&registry, "bank_cards_issued_total", "Cards issued")?;
        let rejected_operations_total = int_counter(
            &registry,
            "bank_rejected_operations_total",
            "Operations rejected by validation",
        )?;

        let operation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "bank_operation_duration_seconds",
                "Histogram of mutation latencies",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        Ok(Self {
            accounts_opened_total,
            accounts_closed_total,
            deposits_total,
            withdrawals_total,
            transfers_total,
            internal_transfers_total,
            cards_issued_total,
            rejected_operations_total,
            operation_duration,
            registry,
        })
    }

    /// Record a rejected operation
    pub fn record_rejection(&self) {
        self.rejected_operations_total.inc();
    }

    /// Record mutation latency
    pub fn record_operation_duration(&self, duration_seconds: f64) {
        self.operation_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

fn int_counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.deposits_total.get(), 0);
        assert_eq!(metrics.rejected_operations_total.get(), 0);
    }

    #[test]
    fn test_counters_increment() {
        let metrics = Metrics::new().unwrap();
        metrics.deposits_total.inc();
        metrics.deposits_total.inc();
        assert_eq!(metrics.deposits_total.get(), 2);

        metrics.record_rejection();
        assert_eq!(metrics.rejected_operations_total.get(), 1);
    }

    #[test]
    fn test_instances_are_independent() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.deposits_total.inc();
        assert_eq!(a.deposits_total.get(), 1);
        assert_eq!(b.deposits_total.get(), 0);
    }

    #[test]
    fn test_registry_gather() {
        let metrics = Metrics::new().unwrap();
        metrics.record_operation_duration(0.005);
        let families = metrics.registry().gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "bank_operation_duration_seconds"));
    }
}
