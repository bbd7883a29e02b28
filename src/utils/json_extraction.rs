//! JSON extraction utilities for parsing LLM responses.
//!
//! Content payloads are requested as a single JSON object, but models still
//! wrap them in markdown fences, prepend commentary, get cut off mid-object,
//! or emit LaTeX backslashes that are not valid JSON escapes. The extraction
//! strategies, in order:
//! 1. JSON in a ```json (or generic) code fence
//! 2. Content that starts with '{', up to its matching brace
//! 3. The first balanced object anywhere in the content
//!
//! Each candidate is parsed as-is first, then again after repairing invalid
//! escape sequences.
//!
//! # Example
//!
//! ```
//! use lessonforge::utils::json_extraction::extract_json_object;
//!
//! let response = "Here you go:\n```json\n{\"passage_a\": \"text\"}\n```";
//! let value = extract_json_object(response).unwrap();
//! assert_eq!(value["passage_a"], "text");
//! ```

use serde_json::Value;
use thiserror::Error;

/// Error type for JSON extraction failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated: {unclosed_braces} unclosed braces, {unclosed_brackets} unclosed brackets")]
    Truncated {
        unclosed_braces: usize,
        unclosed_brackets: usize,
    },
    #[error("No JSON object found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },
}

/// Extracts the content payload object from a raw model response.
pub fn extract_json_object(content: &str) -> Result<Value, JsonExtractionError> {
    let trimmed = content.trim();

    let mut candidates = Vec::new();
    if let Some(block) = extract_from_code_block(trimmed) {
        candidates.push(block);
    }
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = find_matching_brace(&trimmed[start..]) {
            candidates.push(trimmed[start..=start + end].to_string());
        }
    }

    for candidate in &candidates {
        if let Some(value) = parse_object(candidate) {
            return Ok(value);
        }
    }

    if let Some(start) = trimmed.find('{') {
        let (unclosed_braces, unclosed_brackets) = unclosed_delimiters(&trimmed[start..]);
        if unclosed_braces > 0 || unclosed_brackets > 0 {
            return Err(JsonExtractionError::Truncated {
                unclosed_braces,
                unclosed_brackets,
            });
        }
    }

    Err(JsonExtractionError::NotFound {
        content_preview: trimmed.chars().take(50).collect(),
    })
}

fn parse_object(candidate: &str) -> Option<Value> {
    let parsed = serde_json::from_str::<Value>(candidate)
        .ok()
        .or_else(|| serde_json::from_str::<Value>(&repair_invalid_escapes(candidate)).ok())?;
    parsed.is_object().then_some(parsed)
}

/// Returns the body of the first fenced code block, preferring ```json fences.
pub fn extract_from_code_block(content: &str) -> Option<String> {
    let start = content
        .find("```json")
        .map(|i| i + "```json".len())
        .or_else(|| content.find("```").map(|i| i + 3))?;
    let rest = &content[start..];
    // Skip a language tag on the opening fence line.
    let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &rest[body_start..];
    let end = body.find("```")?;
    let block = body[..end].trim();
    (!block.is_empty()).then(|| block.to_string())
}

/// Finds the index of the brace closing the object that `s` starts with.
///
/// Braces inside string literals (including escaped quotes) are ignored.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Counts braces and brackets left open at the end of `s`.
fn unclosed_delimiters(s: &str) -> (usize, usize) {
    let mut braces: isize = 0;
    let mut brackets: isize = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for c in s.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => braces += 1,
            '}' if !in_string => braces -= 1,
            '[' if !in_string => brackets += 1,
            ']' if !in_string => brackets -= 1,
            _ => {}
        }
    }

    (braces.max(0) as usize, brackets.max(0) as usize)
}

/// Doubles backslashes that do not start a valid JSON escape sequence.
///
/// Models writing LaTeX inside JSON strings often emit `\(` or `\alpha`
/// verbatim, which strict JSON parsers reject.
pub fn repair_invalid_escapes(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 16);
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
                out.push('\\');
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            _ => out.push_str("\\\\"),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_direct_object() {
        let value = extract_json_object(r#"{"a": 1}"#).expect("object");
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn test_extracts_from_json_fence() {
        let content = "Sure!\n```json\n{\"a\": {\"b\": \"}\"}}\n```\nDone.";
        let value = extract_json_object(content).expect("object");
        assert_eq!(value["a"]["b"], "}");
    }

    #[test]
    fn test_extracts_object_after_prose() {
        let content = "Here is the content you asked for: {\"quiz\": []} hope it helps";
        let value = extract_json_object(content).expect("object");
        assert!(value["quiz"].is_array());
    }

    #[test]
    fn test_repairs_latex_escapes() {
        let content = r#"{"passage_a": "the value \(x^2\) grows"}"#;
        let value = extract_json_object(content).expect("object after repair");
        assert_eq!(value["passage_a"], r"the value \(x^2\) grows");
    }

    #[test]
    fn test_detects_truncation() {
        let err = extract_json_object(r#"{"passage_a": "cut off", "quiz": [{"type": "#)
            .expect_err("truncated");
        assert_eq!(
            err,
            JsonExtractionError::Truncated {
                unclosed_braces: 2,
                unclosed_brackets: 1
            }
        );
    }

    #[test]
    fn test_not_found() {
        let err = extract_json_object("I cannot help with that.").expect_err("no json");
        assert!(matches!(err, JsonExtractionError::NotFound { .. }));
    }

    #[test]
    fn test_arrays_are_not_payloads() {
        assert!(extract_json_object("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_find_matching_brace_ignores_strings() {
        assert_eq!(find_matching_brace(r#"{"a": "{{"}"#), Some(10));
        assert_eq!(find_matching_brace("{"), None);
    }
}
