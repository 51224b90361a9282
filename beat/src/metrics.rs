//! Prometheus metrics for mysqlbeat

use crate::error::{BeatError, Result};
use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, TextEncoder, register_counter_vec, register_gauge,
    register_histogram,
};
use std::sync::OnceLock;

/// Global metrics instance
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// All mysqlbeat metrics
pub struct Metrics {
    // ─────────────────────────────────────────────────────────────────────────
    // Poll cycles
    // ─────────────────────────────────────────────────────────────────────────
    /// Cycles run (by outcome: completed, interrupted, connection_error)
    pub poll_cycles: CounterVec,

    /// Wall time of one cycle in seconds
    pub cycle_duration_seconds: Histogram,

    /// Statements executed (by source, outcome)
    pub statements: CounterVec,

    // ─────────────────────────────────────────────────────────────────────────
    // Connection & output
    // ─────────────────────────────────────────────────────────────────────────
    /// Connection attempts (by outcome: success, failure)
    pub connection_attempts: CounterVec,

    /// Events handed to the output (by source, outcome)
    pub events_published: CounterVec,

    /// Output health (1 = healthy, 0 = unhealthy)
    pub output_health: Gauge,

    /// Poller state (0=idle, 1=polling, 2=stopping, 3=stopped)
    pub poller_state: Gauge,
}

impl Metrics {
    /// Initialize metrics (call once at startup)
    pub fn init() -> Result<&'static Metrics> {
        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }

        let metrics = Metrics {
            poll_cycles: register_counter_vec!(
                "mysqlbeat_poll_cycles_total",
                "Total poll cycles run",
                &["outcome"]
            )
            .map_err(|e| BeatError::Metrics(format!("poll_cycles: {e}")))?,

            cycle_duration_seconds: register_histogram!(
                "mysqlbeat_cycle_duration_seconds",
                "Time spent running one poll cycle",
                // 1ms to 60s
                vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0]
            )
            .map_err(|e| BeatError::Metrics(format!("cycle_duration_seconds: {e}")))?,

            statements: register_counter_vec!(
                "mysqlbeat_statements_total",
                "Total introspection statements executed",
                &["source", "outcome"]
            )
            .map_err(|e| BeatError::Metrics(format!("statements: {e}")))?,

            connection_attempts: register_counter_vec!(
                "mysqlbeat_connection_attempts_total",
                "Total attempts to open a database connection",
                &["outcome"]
            )
            .map_err(|e| BeatError::Metrics(format!("connection_attempts: {e}")))?,

            events_published: register_counter_vec!(
                "mysqlbeat_events_published_total",
                "Total events handed to the output",
                &["source", "outcome"]
            )
            .map_err(|e| BeatError::Metrics(format!("events_published: {e}")))?,

            output_health: register_gauge!(
                "mysqlbeat_output_health",
                "Output health (1 = healthy, 0 = unhealthy)"
            )
            .map_err(|e| BeatError::Metrics(format!("output_health: {e}")))?,

            poller_state: register_gauge!(
                "mysqlbeat_poller_state",
                "Poller state (0=idle, 1=polling, 2=stopping, 3=stopped)"
            )
            .map_err(|e| BeatError::Metrics(format!("poller_state: {e}")))?,
        };

        // Only the first set wins
        let _ = METRICS.set(metrics);

        METRICS
            .get()
            .ok_or_else(|| BeatError::Metrics("failed to initialize metrics".to_string()))
    }

    /// Get the global metrics instance
    ///
    /// Returns None if metrics haven't been initialized yet.
    pub fn get() -> Option<&'static Metrics> {
        METRICS.get()
    }

    /// Record a finished cycle
    pub fn record_cycle(&self, outcome: &str, seconds: f64) {
        self.poll_cycles.with_label_values(&[outcome]).inc();
        self.cycle_duration_seconds.observe(seconds);
    }

    /// Record one statement outcome
    pub fn record_statement(&self, source: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "failed" };
        self.statements.with_label_values(&[source, outcome]).inc();
    }

    /// Record one connection attempt
    pub fn record_connection_attempt(&self, ok: bool) {
        let outcome = if ok { "success" } else { "failure" };
        self.connection_attempts.with_label_values(&[outcome]).inc();
    }

    /// Record one publish outcome
    pub fn record_published(&self, source: &str, accepted: bool) {
        let outcome = if accepted { "accepted" } else { "rejected" };
        self.events_published
            .with_label_values(&[source, outcome])
            .inc();
    }

    /// Set output health
    pub fn set_output_health(&self, healthy: bool) {
        self.output_health.set(if healthy { 1.0 } else { 0.0 });
    }

    /// Set the poller state gauge
    pub fn set_poller_state(&self, code: u8) {
        self.poller_state.set(f64::from(code));
    }
}

/// Gather all metrics and encode as Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_ok() {
        String::from_utf8(buffer).unwrap_or_default()
    } else {
        String::new()
    }
}

/// Record a connection attempt if metrics are initialized
pub fn try_record_connection_attempt(ok: bool) {
    if let Some(m) = Metrics::get() {
        m.record_connection_attempt(ok);
    }
}

/// Record a statement outcome if metrics are initialized
pub fn try_record_statement(source: &str, ok: bool) {
    if let Some(m) = Metrics::get() {
        m.record_statement(source, ok);
    }
}

/// Record a publish outcome if metrics are initialized
pub fn try_record_published(source: &str, accepted: bool) {
    if let Some(m) = Metrics::get() {
        m.record_published(source, accepted);
    }
}
