//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Reconciliation Metrics
    pub static ref RECONCILE_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authsession_reconcile_total", "Total number of reconcile calls by outcome"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref REMOTE_CHECKS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authsession_remote_checks_total", "Total number of identity authority queries"),
        &["result"]
    ).expect("metric can be created");
    pub static ref REMOTE_CHECK_DURATION_SECONDS: prometheus::Histogram = prometheus::Histogram::with_opts(
        HistogramOpts::new(
            "authsession_remote_check_duration_seconds",
            "Identity authority query duration in seconds"
        ).buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0])
    ).expect("metric can be created");

    // Session Metrics
    pub static ref TRANSITIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authsession_transitions_total", "Total number of session state transitions"),
        &["status"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("authsession_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(RECONCILE_TOTAL.clone()))
        .expect("RECONCILE_TOTAL can be registered");
    REGISTRY
        .register(Box::new(REMOTE_CHECKS_TOTAL.clone()))
        .expect("REMOTE_CHECKS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(REMOTE_CHECK_DURATION_SECONDS.clone()))
        .expect("REMOTE_CHECK_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(TRANSITIONS_TOTAL.clone()))
        .expect("TRANSITIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}

/// Render all registered metrics in the Prometheus text exposition format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(error) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!(%error, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_per_label() {
        let before = RECONCILE_TOTAL.with_label_values(&["coalesced"]).get();
        RECONCILE_TOTAL.with_label_values(&["coalesced"]).inc();
        assert_eq!(
            RECONCILE_TOTAL.with_label_values(&["coalesced"]).get(),
            before + 1
        );
    }
}
