//! Prometheus metrics for the sweep scheduler.

use crate::types::ServerStatus;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::time::Duration;

/// Labels for server check metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CheckLabels {
    /// Result (ok, unreachable, delegation_failed)
    pub result: String,
}

/// Metrics registry for sweep cycles and server checks
pub struct SweepMetrics {
    /// Prometheus registry
    pub registry: Registry,

    /// Completed cycles
    sweeps_total: Counter,
    /// Cycles abandoned because the group list could not be fetched
    sweep_failures_total: Counter,
    /// Cycle duration
    sweep_duration_seconds: Histogram,
    /// Server checks by result
    server_checks_total: Family<CheckLabels, Counter>,
    /// Group nodes in the tree
    groups: Gauge,
    /// Server nodes in the tree
    servers: Gauge,
}

impl SweepMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let sweeps_total = Counter::default();
        registry.register(
            "federation_sweeps",
            "Completed sweep cycles",
            sweeps_total.clone(),
        );

        let sweep_failures_total = Counter::default();
        registry.register(
            "federation_sweep_failures",
            "Sweep cycles skipped because the group list fetch failed",
            sweep_failures_total.clone(),
        );

        // 100ms to ~200s
        let sweep_duration_seconds = Histogram::new(exponential_buckets(0.1, 2.0, 12));
        registry.register(
            "federation_sweep_duration_seconds",
            "Sweep cycle duration in seconds",
            sweep_duration_seconds.clone(),
        );

        let server_checks_total = Family::<CheckLabels, Counter>::default();
        registry.register(
            "federation_server_checks",
            "Federation server checks by result",
            server_checks_total.clone(),
        );

        let groups = Gauge::default();
        registry.register("federation_groups", "Group nodes in the status tree", groups.clone());

        let servers = Gauge::default();
        registry.register("federation_servers", "Server nodes in the status tree", servers.clone());

        Self {
            registry,
            sweeps_total,
            sweep_failures_total,
            sweep_duration_seconds,
            server_checks_total,
            groups,
            servers,
        }
    }

    /// Record a completed cycle
    pub fn record_sweep(&self, duration: Duration) {
        self.sweeps_total.inc();
        self.sweep_duration_seconds.observe(duration.as_secs_f64());
    }

    /// Record a cycle abandoned at the group list fetch
    pub fn record_sweep_failure(&self) {
        self.sweep_failures_total.inc();
    }

    /// Record the outcome of one server check
    pub fn record_check(&self, status: &ServerStatus) {
        self.server_checks_total
            .get_or_create(&CheckLabels {
                result: status.label().to_string(),
            })
            .inc();
    }

    /// Update tree size gauges
    pub fn update_tree_size(&self, groups: usize, servers: usize) {
        self.groups.set(groups as i64);
        self.servers.set(servers as i64);
    }
}

impl Default for SweepMetrics {
    fn default() -> Self {
        Self::new()
    }
}
