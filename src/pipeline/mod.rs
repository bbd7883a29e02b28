//! Batch generation pipeline.
//!
//! # Architecture
//!
//! - **Retry controller**: runs one unit's generate-and-validate attempts with
//!   bounded exponential backoff and jitter
//! - **Orchestrator**: partitions a parent's units by stored state, dispatches
//!   the missing ones, persists successes and reconciles against the store
//! - **Config**: retry, pacing and process settings
//! - **Events**: optional progress stream
//!
//! # Pipeline Flow
//!
//! 1. **Partition**: units that already have a stored record are skipped
//! 2. **Dispatch**: the rest run in ascending sequence order, spaced by the
//!    inter-unit delay, at most `max_in_flight` at a time
//! 3. **Attempt**: generation call, then contract validation; transient and
//!    validation failures are retried, permanent ones are not
//! 4. **Persist**: successes go through the store's insert-then-update upsert
//! 5. **Reconcile**: the store is re-read and bookkeeping corrected by key
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lessonforge::pipeline::{BatchConfig, BatchOrchestrator};
//! use lessonforge::validation::ContentValidator;
//!
//! let orchestrator = BatchOrchestrator::new(
//!     generator,
//!     store,
//!     ContentValidator::default(),
//!     BatchConfig::default(),
//! );
//!
//! let result = orchestrator.generate_batch("lecture-42", units).await?;
//! println!("{}", result.summary());
//! for failure in &result.failed {
//!     println!("{}", failure.user_message());
//! }
//! ```

pub mod config;
pub mod events;
pub mod orchestrator;
pub mod retry;

pub use config::{BatchConfig, ConfigError, PipelineConfig, RetryPolicy};
pub use events::PipelineEvent;
pub use orchestrator::{
    BatchOrchestrator, BatchResult, BatchStatus, FailureReason, OrchestratorError, UnitFailure,
};
pub use retry::{AttemptError, GenerationAttempt, RetryController, RetryOutcome, UnitState};
