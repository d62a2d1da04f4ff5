//! Prometheus metrics for server monitoring
//!
//! Metrics live in a process-wide registry shared by every monitor.

use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::OnceLock;

/// Global metrics registry
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Monitor metrics collection
pub struct Metrics {
    /// Registry for all metrics
    pub registry: Registry,

    /// Completed heartbeats by outcome
    pub heartbeat_total: IntCounterVec,
    /// Failed heartbeat attempts by stage
    pub heartbeat_attempt_failures_total: IntCounterVec,
    /// Raw heartbeat round-trip time (in seconds)
    pub heartbeat_rtt_seconds: Histogram,
    /// Open subscriber mailboxes across all monitors
    pub monitor_subscribers: IntGauge,
}

impl Metrics {
    /// Create a new metrics collection
    pub fn new() -> Self {
        let registry = Registry::new();

        let heartbeat_total = IntCounterVec::new(
            Opts::new(
                "athena_heartbeat_total",
                "Total number of heartbeats by outcome",
            ),
            &["outcome"], // success, failure
        )
        .unwrap();

        let heartbeat_attempt_failures_total = IntCounterVec::new(
            Opts::new(
                "athena_heartbeat_attempt_failures_total",
                "Total number of failed heartbeat attempts by stage",
            ),
            &["stage"], // dial, exchange
        )
        .unwrap();

        let heartbeat_rtt_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "athena_heartbeat_rtt_seconds",
                "Heartbeat round-trip time in seconds",
            )
            .buckets(vec![
                0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ]),
        )
        .unwrap();

        let monitor_subscribers = IntGauge::new(
            "athena_monitor_subscribers",
            "Current number of open subscriber mailboxes",
        )
        .unwrap();

        registry
            .register(Box::new(heartbeat_total.clone()))
            .unwrap();
        registry
            .register(Box::new(heartbeat_attempt_failures_total.clone()))
            .unwrap();
        registry
            .register(Box::new(heartbeat_rtt_seconds.clone()))
            .unwrap();
        registry
            .register(Box::new(monitor_subscribers.clone()))
            .unwrap();

        Self {
            registry,
            heartbeat_total,
            heartbeat_attempt_failures_total,
            heartbeat_rtt_seconds,
            monitor_subscribers,
        }
    }

    /// Record a successful heartbeat and its raw RTT
    pub fn record_heartbeat_success(&self, rtt_secs: f64) {
        self.heartbeat_total.with_label_values(&["success"]).inc();
        self.heartbeat_rtt_seconds.observe(rtt_secs);
    }

    /// Record a heartbeat that exhausted its attempts
    pub fn record_heartbeat_failure(&self) {
        self.heartbeat_total.with_label_values(&["failure"]).inc();
    }

    /// Record a failed attempt
    pub fn record_attempt_failure(&self, stage: &str) {
        self.heartbeat_attempt_failures_total
            .with_label_values(&[stage])
            .inc();
    }

    /// Get metrics as Prometheus text format
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
