//! Normalization of raw model output into a [`CandidateContent`].
//!
//! Models drift from the requested shape in predictable ways: camelCase keys,
//! `questions` instead of `quiz`, `"true"` instead of `true`, or a letter
//! instead of the option text. These are repaired here, before validation;
//! anything that cannot be repaired is passed through for the validator to
//! reject.

use serde_json::{Map, Value};

use crate::content::{CandidateAnswer, CandidateContent, CandidateQuestion, QuestionKind};

const PASSAGE_A_KEYS: &[&str] = &["passage_a", "passageA", "passage1", "passage_1"];
const PASSAGE_B_KEYS: &[&str] = &["passage_b", "passageB", "passage2", "passage_2"];
const QUIZ_KEYS: &[&str] = &["quiz", "questions", "quiz_items", "quizItems"];
const KIND_KEYS: &[&str] = &["type", "kind", "question_type", "questionType"];
const ANSWER_KEYS: &[&str] = &["correct_answer", "correctAnswer", "answer"];

/// Converts a parsed JSON object into a candidate payload.
pub fn normalize_payload(value: &Value) -> CandidateContent {
    let Some(object) = value.as_object() else {
        return CandidateContent::default();
    };

    let quiz = first_of(object, QUIZ_KEYS)
        .and_then(Value::as_array)
        .map(|items| items.iter().map(normalize_question).collect())
        .unwrap_or_default();

    CandidateContent {
        passage_a: string_of(object, PASSAGE_A_KEYS),
        passage_b: string_of(object, PASSAGE_B_KEYS),
        quiz,
    }
}

fn normalize_question(value: &Value) -> CandidateQuestion {
    let Some(object) = value.as_object() else {
        return CandidateQuestion::default();
    };

    let kind = string_of(object, KIND_KEYS);
    let options: Vec<String> = object
        .get("options")
        .and_then(Value::as_array)
        .map(|opts| opts.iter().filter_map(scalar_to_string).collect())
        .unwrap_or_default();

    let raw_answer = first_of(object, ANSWER_KEYS);
    let correct_answer = match QuestionKind::from_declared(&kind) {
        Some(QuestionKind::TrueFalse) => raw_answer.and_then(coerce_boolean),
        Some(QuestionKind::MultipleChoice) => {
            raw_answer.and_then(|answer| coerce_choice(answer, &options))
        }
        None => raw_answer.and_then(passthrough_answer),
    };

    CandidateQuestion {
        kind,
        question: string_of(object, &["question", "prompt"]),
        options,
        correct_answer,
        explanation: string_of(object, &["explanation", "rationale"]),
    }
}

fn first_of<'a>(object: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| object.get(*key))
}

fn string_of(object: &Map<String, Value>, keys: &[&str]) -> String {
    first_of(object, keys)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn passthrough_answer(value: &Value) -> Option<CandidateAnswer> {
    match value {
        Value::Bool(b) => Some(CandidateAnswer::Bool(*b)),
        other => scalar_to_string(other).map(CandidateAnswer::Text),
    }
}

/// Turns stringified booleans into real ones; other strings pass through so
/// the validator can reject them.
fn coerce_boolean(value: &Value) -> Option<CandidateAnswer> {
    match value {
        Value::Bool(b) => Some(CandidateAnswer::Bool(*b)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" => Some(CandidateAnswer::Bool(true)),
            "false" | "f" | "no" => Some(CandidateAnswer::Bool(false)),
            _ => Some(CandidateAnswer::Text(s.clone())),
        },
        other => scalar_to_string(other).map(CandidateAnswer::Text),
    }
}

/// Maps a letter answer ("B") or a zero-based index onto the option text when
/// the raw answer is not already one of the options. A number that matches an
/// option's text is that option, not an index.
fn coerce_choice(value: &Value, options: &[String]) -> Option<CandidateAnswer> {
    match value {
        Value::String(s) if options.contains(s) => Some(CandidateAnswer::Text(s.clone())),
        Value::String(s) => {
            let letter = s.trim().trim_end_matches([')', '.']);
            let index = match letter.as_bytes() {
                [c @ b'A'..=b'Z'] => Some((c - b'A') as usize),
                [c @ b'a'..=b'z'] => Some((c - b'a') as usize),
                _ => None,
            };
            let mapped = index.and_then(|i| options.get(i)).cloned();
            Some(CandidateAnswer::Text(mapped.unwrap_or_else(|| s.clone())))
        }
        Value::Number(n) if options.contains(&n.to_string()) => {
            Some(CandidateAnswer::Text(n.to_string()))
        }
        Value::Number(n) => {
            let mapped = n
                .as_u64()
                .and_then(|i| options.get(i as usize))
                .cloned()
                .unwrap_or_else(|| n.to_string());
            Some(CandidateAnswer::Text(mapped))
        }
        other => passthrough_answer(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_shape() {
        let value = json!({
            "passage_a": "A",
            "passage_b": "B",
            "quiz": [
                {"type": "multiple_choice", "question": "Q1", "options": ["x", "y"], "correct_answer": "y", "explanation": "E1"},
                {"type": "true_false", "question": "Q2", "correct_answer": false, "explanation": "E2"}
            ]
        });

        let candidate = normalize_payload(&value);
        assert_eq!(candidate.passage_a, "A");
        assert_eq!(candidate.passage_b, "B");
        assert_eq!(
            candidate.quiz[0].correct_answer,
            Some(CandidateAnswer::Text("y".into()))
        );
        assert_eq!(
            candidate.quiz[1].correct_answer,
            Some(CandidateAnswer::Bool(false))
        );
    }

    #[test]
    fn test_stringified_boolean_is_coerced() {
        let value = json!({
            "questions": [
                {"type": "multiple_choice", "options": ["a", "b"], "answer": "a"},
                {"kind": "true-false", "correctAnswer": "True"}
            ]
        });

        let candidate = normalize_payload(&value);
        assert_eq!(candidate.quiz.len(), 2);
        assert_eq!(
            candidate.quiz[1].correct_answer,
            Some(CandidateAnswer::Bool(true))
        );
    }

    #[test]
    fn test_unrecognized_boolean_text_passes_through() {
        let value = json!({"quiz": [{}, {"type": "true_false", "correct_answer": "maybe"}]});
        let candidate = normalize_payload(&value);
        assert_eq!(
            candidate.quiz[1].correct_answer,
            Some(CandidateAnswer::Text("maybe".into()))
        );
    }

    #[test]
    fn test_numeric_answer_matching_an_option_is_kept() {
        let value = json!({"quiz": [
            {"type": "multiple_choice", "question": "What is 1 + 1?", "options": [1, 2, 3, 4], "correct_answer": 2}
        ]});
        let candidate = normalize_payload(&value);
        assert_eq!(candidate.quiz[0].options, vec!["1", "2", "3", "4"]);
        assert_eq!(
            candidate.quiz[0].correct_answer,
            Some(CandidateAnswer::Text("2".into()))
        );
    }

    #[test]
    fn test_numeric_answer_outside_options_maps_to_index() {
        let value = json!({"quiz": [
            {"type": "multiple_choice", "options": ["Paris", "Rome", "Oslo"], "correct_answer": 2}
        ]});
        let candidate = normalize_payload(&value);
        assert_eq!(
            candidate.quiz[0].correct_answer,
            Some(CandidateAnswer::Text("Oslo".into()))
        );
    }

    #[test]
    fn test_letter_answer_maps_to_option() {
        let value = json!({"quiz": [
            {"type": "multiple_choice", "options": ["Paris", "Rome", "Oslo"], "correct_answer": "B)"}
        ]});
        let candidate = normalize_payload(&value);
        assert_eq!(
            candidate.quiz[0].correct_answer,
            Some(CandidateAnswer::Text("Rome".into()))
        );
    }

    #[test]
    fn test_camel_case_passages() {
        let value = json!({"passageA": "first", "passageB": "second"});
        let candidate = normalize_payload(&value);
        assert_eq!(candidate.passage_a, "first");
        assert_eq!(candidate.passage_b, "second");
        assert!(candidate.quiz.is_empty());
    }

    #[test]
    fn test_non_object_yields_empty_candidate() {
        assert_eq!(normalize_payload(&json!([1, 2])), CandidateContent::default());
    }
}
