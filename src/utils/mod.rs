//! Shared utility functions for lessonforge.
//!
//! This module provides common utilities used across multiple modules,
//! including JSON extraction from LLM responses.

pub mod json_extraction;

pub use json_extraction::{
    extract_from_code_block, extract_json_object, find_matching_brace, repair_invalid_escapes,
    JsonExtractionError,
};
