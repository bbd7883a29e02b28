//! Prometheus metrics registration and export.
//!
//! This module defines the Prometheus metrics used by lessonforge and provides
//! functions for initializing, registering, and exporting them.

use prometheus::{CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

/// Global Prometheus registry for all lessonforge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Generation attempts, labeled by outcome (`success`, `transient`,
/// `permanent`, `invalid`).
pub static GENERATION_ATTEMPTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Units that reached a terminal state, labeled by status (`completed`,
/// `skipped`, `failed`, `cancelled`).
pub static UNITS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Latency of single generation calls in seconds.
pub static GENERATION_SECONDS: OnceLock<Histogram> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. A second call is harmless: the first registry wins.
///
/// # Errors
///
/// Returns a `prometheus::Error` if a metric cannot be created or registered.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let attempts_total = CounterVec::new(
        Opts::new(
            "lessonforge_generation_attempts_total",
            "Generation attempts by outcome",
        ),
        &["outcome"],
    )?;

    let units_total = CounterVec::new(
        Opts::new("lessonforge_units_total", "Units by terminal status"),
        &["status"],
    )?;

    let generation_seconds = Histogram::with_opts(
        HistogramOpts::new(
            "lessonforge_generation_seconds",
            "Latency of one generation call in seconds",
        )
        .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 20.0, 30.0]),
    )?;

    registry.register(Box::new(attempts_total.clone()))?;
    registry.register(Box::new(units_total.clone()))?;
    registry.register(Box::new(generation_seconds.clone()))?;

    // Already set means already initialized.
    let _ = REGISTRY.set(registry);
    let _ = GENERATION_ATTEMPTS_TOTAL.set(attempts_total);
    let _ = UNITS_TOTAL.set(units_total);
    let _ = GENERATION_SECONDS.set(generation_seconds);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Renders all registered metrics in the Prometheus text exposition format.
///
/// Returns a comment line instead of failing when the registry has not been
/// initialized or encoding fails.
pub fn gather_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
