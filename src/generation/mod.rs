//! Content generation for a single unit.
//!
//! [`LlmContentGenerator`] turns one [`crate::content::Unit`] into one
//! upstream call and hands back either an untrusted
//! [`crate::content::CandidateContent`] or a classified
//! [`crate::error::GenerationError`]. Retrying is the pipeline's job.

pub mod client;
pub mod normalize;
pub mod prompt;

pub use client::{ContentGenerator, LlmContentGenerator, GENERATION_TIMEOUT};
pub use normalize::normalize_payload;
pub use prompt::{build_messages, truncate_reference, MAX_REFERENCE_CHARS};
