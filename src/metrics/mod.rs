//! Prometheus-based monitoring for generation runs.
//!
//! # Example
//!
//! ```ignore
//! use lessonforge::metrics::{gather_metrics, init_metrics};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! // ... run batches ...
//! println!("{}", gather_metrics());
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::{observe_generation, record_attempt, record_unit};
pub use prometheus::{
    gather_metrics, init_metrics, GENERATION_ATTEMPTS_TOTAL, GENERATION_SECONDS, REGISTRY,
    UNITS_TOTAL,
};
