//! lessonforge: content generation pipeline for segmented lectures.
//!
//! For every segment of a parent resource the pipeline asks a language model
//! for two explanatory passages and a two-question quiz, validates the
//! result against a strict contract, retries transient failures with
//! backoff, and persists accepted content idempotently.

pub mod cli;
pub mod content;
pub mod error;
pub mod generation;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod storage;
pub mod utils;
pub mod validation;

pub use content::{ContentRecord, StoredRecord, Unit, UnitKey};
pub use error::{GenerationError, LlmError};
pub use generation::{ContentGenerator, LlmContentGenerator};
pub use pipeline::{BatchOrchestrator, BatchResult, BatchStatus, PipelineConfig};
pub use storage::{InMemoryUnitStore, SqliteUnitStore, StoreError, UnitStore};
pub use validation::{ContentValidator, ValidationReport};
