//! Content contract validation.
//!
//! This module checks generated unit content against the structural contract
//! (word bands, math delimiters, quiz consistency) before it is persisted.

pub mod content_validator;
pub mod notation;

pub use content_validator::{
    ContentValidator, ContractRules, ContractWarning, ValidationReport, Violation,
    QUIZ_ITEM_COUNT,
};
pub use notation::{has_math_delimiters, math_indicators, word_count, MarkupSignals};
