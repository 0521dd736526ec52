//! Metrics collection for observability
//!
//! # Metrics
//!
//! - `rotation_groups_created_total` - Groups created
//! - `rotation_contributions_total` - Contribution records accepted
//! - `rotation_distributions_total` - Completed pot payouts
//! - `rotation_rollovers_total` - Cycle rollovers
//! - `rotation_lock_timeouts_total` - Group lock waits that surfaced `Busy`
//! - `rotation_operation_duration_seconds` - Mutation latency histogram

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
///
/// Collectors register against an engine-scoped registry so multiple engines
/// can coexist in one process.
#[derive(Clone)]
pub struct Metrics {
    /// Groups created
    pub groups_created_total: IntCounter,

    /// Contribution records accepted
    pub contributions_total: IntCounter,

    /// Completed pot payouts
    pub distributions_total: IntCounter,

    /// Cycle rollovers
    pub rollovers_total: IntCounter,

    /// Group lock waits that surfaced `Busy`
    pub lock_timeouts_total: IntCounter,

    /// Mutation latency histogram
    pub operation_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let groups_created_total = IntCounter::with_opts(Opts::new(
            "rotation_groups_created_total",
            "Groups created",
        ))?;
        registry.register(Box::new(groups_created_total.clone()))?;

        let contributions_total = IntCounter::with_opts(Opts::new(
            "rotation_contributions_total",
            "Contribution records accepted",
        ))?;
        registry.register(Box::new(contributions_total.clone()))?;

        let distributions_total = IntCounter::with_opts(Opts::new(
            "rotation_distributions_total",
            "Completed pot payouts",
        ))?;
        registry.register(Box::new(distributions_total.clone()))?;

        let rollovers_total = IntCounter::with_opts(Opts::new(
            "rotation_rollovers_total",
            "Cycle rollovers",
        ))?;
        registry.register(Box::new(rollovers_total.clone()))?;

        let lock_timeouts_total = IntCounter::with_opts(Opts::new(
            "rotation_lock_timeouts_total",
            "Group lock waits that surfaced Busy",
        ))?;
        registry.register(Box::new(lock_timeouts_total.clone()))?;

        let operation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "rotation_operation_duration_seconds",
                "Mutation latency",
            )
            .buckets(vec![
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0,
            ]),
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        Ok(Self {
            groups_created_total,
            contributions_total,
            distributions_total,
            rollovers_total,
            lock_timeouts_total,
            operation_duration,
            registry,
        })
    }

    /// Record group creation
    pub fn record_group_created(&self) {
        self.groups_created_total.inc();
    }

    /// Record an accepted contribution
    pub fn record_contribution(&self) {
        self.contributions_total.inc();
    }

    /// Record a completed payout
    pub fn record_distribution(&self) {
        self.distributions_total.inc();
    }

    /// Record a cycle rollover
    pub fn record_rollover(&self) {
        self.rollovers_total.inc();
    }

    /// Record a lock wait timeout
    pub fn record_lock_timeout(&self) {
        self.lock_timeouts_total.inc();
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.groups_created_total.get(), 0);
        assert_eq!(metrics.distributions_total.get(), 0);
    }

    #[test]
    fn test_multiple_collectors_coexist() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();

        first.record_group_created();
        assert_eq!(first.groups_created_total.get(), 1);
        assert_eq!(second.groups_created_total.get(), 0);
    }

    #[test]
    fn test_counters_increment() {
        let metrics = Metrics::new().unwrap();

        metrics.record_group_created();
        metrics.record_contribution();
        metrics.record_distribution();
        metrics.record_rollover();
        metrics.record_lock_timeout();

        assert_eq!(metrics.groups_created_total.get(), 1);
        assert_eq!(metrics.contributions_total.get(), 1);
        assert_eq!(metrics.distributions_total.get(), 1);
        assert_eq!(metrics.rollovers_total.get(), 1);
        assert_eq!(metrics.lock_timeouts_total.get(), 1);
    }
}
