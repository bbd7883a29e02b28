//! Recording helpers over the raw Prometheus metrics.
//!
//! Every helper is a no-op until [`init_metrics`](super::init_metrics) has
//! run, so library code and tests can record unconditionally.

use std::time::Duration;

use super::prometheus::{GENERATION_ATTEMPTS_TOTAL, GENERATION_SECONDS, UNITS_TOTAL};

/// Counts one generation attempt under `outcome`.
pub fn record_attempt(outcome: &str) {
    if let Some(counter) = GENERATION_ATTEMPTS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Counts one unit reaching the terminal `status`.
pub fn record_unit(status: &str) {
    if let Some(counter) = UNITS_TOTAL.get() {
        counter.with_label_values(&[status]).inc();
    }
}

/// Observes the latency of one generation call.
pub fn observe_generation(elapsed: Duration, succeeded: bool) {
    if let Some(histogram) = GENERATION_SECONDS.get() {
        histogram.observe(elapsed.as_secs_f64());
    }
    tracing::trace!(
        elapsed_ms = elapsed.as_millis() as u64,
        succeeded,
        "Observed generation latency"
    );
}
