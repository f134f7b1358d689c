//! Engine metrics with Prometheus
//!
//! Exposes operational counters for monitoring and alerting:
//! - Event ingestion outcomes and storage retries
//! - Lifecycle transitions and winner selections
//! - Evaluation decisions and analysis latency
//!
//! NOTE: Experiment and visitor ids are never used as labels; they are
//! unbounded and would blow up series cardinality.

use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    /// Global metrics registry
    pub static ref METRICS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Event Ingestion Metrics
    // ============================================================================

    /// Tracked events by type and outcome
    pub static ref EVENTS_TRACKED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("xp_events_tracked_total", "Total tracked events"),
        &["event_type", "result"]  // result: "recorded", "duplicate", "error"
    ).unwrap();

    /// Counter increments retried after a transient storage failure
    pub static ref EVENT_RETRIES_TOTAL: IntCounter = IntCounter::new(
        "xp_event_retries_total",
        "Counter increments retried after transient storage failures"
    ).unwrap();

    /// Audit log appends that failed after the counter was updated
    pub static ref AUDIT_APPEND_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "xp_audit_append_failures_total",
        "Event log appends that failed after counters were updated"
    ).unwrap();

    // ============================================================================
    // Lifecycle Metrics
    // ============================================================================

    /// Status transitions by target status
    pub static ref EXPERIMENT_TRANSITIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("xp_experiment_transitions_total", "Experiment status transitions"),
        &["to"]
    ).unwrap();

    /// Winner selections by source
    pub static ref WINNER_SELECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("xp_winner_selections_total", "Experiments completed with a selected winner"),
        &["source"]  // source: "override", "recommendation", "auto_apply"
    ).unwrap();

    // ============================================================================
    // Analysis Metrics
    // ============================================================================

    /// Evaluations by recommended action
    pub static ref EVALUATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("xp_evaluations_total", "Winner evaluations by recommended action"),
        &["action"]
    ).unwrap();

    /// Time to build an experiment result
    pub static ref ANALYSIS_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "xp_analysis_duration_seconds",
            "Experiment analysis duration"
        )
        .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0])
    ).unwrap();
}

fn register<C: Collector + Clone + 'static>(collector: &C) -> Result<(), prometheus::Error> {
    match METRICS_REGISTRY.register(Box::new(collector.clone())) {
        Ok(()) | Err(prometheus::Error::AlreadyReg) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Register all metrics with the global registry; safe to call repeatedly
pub fn register_metrics() -> Result<(), prometheus::Error> {
    // Ingestion
    register(&*EVENTS_TRACKED_TOTAL)?;
    register(&*EVENT_RETRIES_TOTAL)?;
    register(&*AUDIT_APPEND_FAILURES_TOTAL)?;

    // Lifecycle
    register(&*EXPERIMENT_TRANSITIONS_TOTAL)?;
    register(&*WINNER_SELECTIONS_TOTAL)?;

    // Analysis
    register(&*EVALUATIONS_TOTAL)?;
    register(&*ANALYSIS_DURATION)?;

    Ok(())
}

/// Prometheus text exposition of the global registry
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&METRICS_REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Helper to time operations with histogram (RAII pattern)
/// Usage: let _timer = Timer::new(ANALYSIS_DURATION.clone());
pub struct Timer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl Timer {
    /// Create timer that records duration to histogram on drop
    pub fn new(histogram: Histogram) -> Self {
        Self {
            histogram,
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}
