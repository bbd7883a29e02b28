//! Prompt construction for unit content generation.
//!
//! The wording here is deliberately plain; what matters to the pipeline is
//! that the request carries the unit's title, description, language and a
//! capped slice of its reference text, and that it asks for the JSON shape
//! the normalizer understands.

use std::borrow::Cow;

use crate::content::Unit;
use crate::llm::Message;
use crate::validation::ContractRules;

/// Reference text budget in characters. Longer reference texts are cut here
/// before sending to stay under upstream request-size limits.
pub const MAX_REFERENCE_CHARS: usize = 12_000;

const TRUNCATION_MARKER: &str = "\n[... reference text truncated ...]";

const SYSTEM_PROMPT: &str = "You write study material for one segment of a lecture. \
Respond with a single JSON object and nothing else.";

/// Caps `text` at [`MAX_REFERENCE_CHARS`] characters, on a char boundary.
pub fn truncate_reference(text: &str) -> Cow<'_, str> {
    match text.char_indices().nth(MAX_REFERENCE_CHARS) {
        None => Cow::Borrowed(text),
        Some((cut, _)) => {
            let mut truncated = String::with_capacity(cut + TRUNCATION_MARKER.len());
            truncated.push_str(&text[..cut]);
            truncated.push_str(TRUNCATION_MARKER);
            Cow::Owned(truncated)
        }
    }
}

/// Builds the chat messages for one unit.
pub fn build_messages(unit: &Unit, rules: &ContractRules) -> Vec<Message> {
    let reference = truncate_reference(&unit.reference_text);

    let user = format!(
        r#"Segment {seq}: {title}
Description: {description}
Language: {language}

Reference material (ground every statement in it):
<<<
{reference}
>>>

Return JSON with exactly these fields:
{{
  "passage_a": "Markdown explanation, {min}-{max} words",
  "passage_b": "Markdown explanation, {min}-{max} words",
  "quiz": [
    {{"type": "multiple_choice", "question": "...", "options": ["...", "..."], "correct_answer": "<one option, verbatim>", "explanation": "..."}},
    {{"type": "true_false", "question": "...", "correct_answer": true, "explanation": "..."}}
  ]
}}

Rules:
- Use headings, lists or **emphasis** to structure each passage.
- Wrap every mathematical expression in $...$ (inline) or $$...$$ (block).
- Write everything in {language}."#,
        seq = unit.sequence_number,
        title = unit.title,
        description = unit.description,
        language = unit.language_preference,
        reference = reference,
        min = rules.min_words,
        max = rules.max_words,
    );

    vec![Message::system(SYSTEM_PROMPT), Message::user(user)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_reference_is_borrowed() {
        let text = "short reference";
        assert!(matches!(truncate_reference(text), Cow::Borrowed(t) if t == text));
    }

    #[test]
    fn test_long_reference_is_capped_on_char_boundary() {
        let text = "é".repeat(MAX_REFERENCE_CHARS + 50);
        let truncated = truncate_reference(&text);

        assert!(truncated.ends_with(TRUNCATION_MARKER));
        let kept = truncated.trim_end_matches(TRUNCATION_MARKER);
        assert_eq!(kept.chars().count(), MAX_REFERENCE_CHARS);
    }

    #[test]
    fn test_exact_budget_is_not_truncated() {
        let text = "a".repeat(MAX_REFERENCE_CHARS);
        assert_eq!(truncate_reference(&text).len(), MAX_REFERENCE_CHARS);
    }

    #[test]
    fn test_messages_carry_unit_fields() {
        let unit = Unit::new("lecture-1", 4, "Eigenvalues")
            .with_description("Intro to eigenvalues")
            .with_reference_text("An eigenvector is ...")
            .with_language("German");

        let messages = build_messages(&unit, &ContractRules::default());
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");

        let user = &messages[1].content;
        assert!(user.contains("Segment 4: Eigenvalues"));
        assert!(user.contains("Intro to eigenvalues"));
        assert!(user.contains("An eigenvector is ..."));
        assert!(user.contains("Write everything in German"));
        assert!(user.contains("300-400 words"));
    }
}
