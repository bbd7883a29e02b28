//! Core content types shared by the generator, validator, store and orchestrator.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Idempotency key of a content record: one record per segment of a parent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitKey {
    /// Owning resource (e.g. a lecture).
    pub parent_id: String,
    /// 1-based position within the parent.
    pub sequence_number: u32,
}

impl UnitKey {
    pub fn new(parent_id: impl Into<String>, sequence_number: u32) -> Self {
        Self {
            parent_id: parent_id.into(),
            sequence_number,
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.parent_id, self.sequence_number)
    }
}

/// One segment of a parent resource that needs generated content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Owning resource (e.g. a lecture).
    pub parent_id: String,
    /// 1-based position, unique within the parent.
    pub sequence_number: u32,
    /// Segment title.
    pub title: String,
    /// Short description of what the segment covers.
    #[serde(default)]
    pub description: String,
    /// Source material the generator must ground itself in.
    #[serde(default)]
    pub reference_text: String,
    /// Target language for the generated content.
    #[serde(default = "default_language")]
    pub language_preference: String,
}

fn default_language() -> String {
    "English".to_string()
}

impl Unit {
    pub fn new(parent_id: impl Into<String>, sequence_number: u32, title: impl Into<String>) -> Self {
        Self {
            parent_id: parent_id.into(),
            sequence_number,
            title: title.into(),
            description: String::new(),
            reference_text: String::new(),
            language_preference: default_language(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_reference_text(mut self, reference_text: impl Into<String>) -> Self {
        self.reference_text = reference_text.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language_preference = language.into();
        self
    }

    pub fn key(&self) -> UnitKey {
        UnitKey::new(self.parent_id.clone(), self.sequence_number)
    }
}

/// Which of the two explanatory passages a finding refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassageSlot {
    A,
    B,
}

impl PassageSlot {
    pub const ALL: [PassageSlot; 2] = [PassageSlot::A, PassageSlot::B];
}

impl fmt::Display for PassageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassageSlot::A => write!(f, "passage_a"),
            PassageSlot::B => write!(f, "passage_b"),
        }
    }
}

/// Declared kind of a quiz item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    TrueFalse,
}

impl QuestionKind {
    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "multiple_choice",
            QuestionKind::TrueFalse => "true_false",
        }
    }

    /// Parses the spellings generators commonly use for the two kinds.
    pub fn from_declared(declared: &str) -> Option<Self> {
        match declared.trim().to_ascii_lowercase().as_str() {
            "multiple_choice" | "multiple-choice" | "multiplechoice" | "mcq" => {
                Some(QuestionKind::MultipleChoice)
            }
            "true_false" | "true-false" | "true/false" | "truefalse" | "boolean" => {
                Some(QuestionKind::TrueFalse)
            }
            _ => None,
        }
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A correct answer as it arrived from the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CandidateAnswer {
    Bool(bool),
    Text(String),
}

/// A quiz item as it arrived from the generator, before the contract check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateQuestion {
    #[serde(rename = "type", alias = "kind", default)]
    pub kind: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_answer: Option<CandidateAnswer>,
    #[serde(default)]
    pub explanation: String,
}

/// Untrusted content payload for one unit.
///
/// Every field defaults so that a lossy payload still deserializes and the
/// validator can report everything that is wrong with it at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub passage_a: String,
    #[serde(default)]
    pub passage_b: String,
    #[serde(default)]
    pub quiz: Vec<CandidateQuestion>,
}

impl CandidateContent {
    pub fn passage(&self, slot: PassageSlot) -> &str {
        match slot {
            PassageSlot::A => &self.passage_a,
            PassageSlot::B => &self.passage_b,
        }
    }
}

/// Validated multiple-choice item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipleChoiceQuestion {
    pub question: String,
    pub options: Vec<String>,
    /// Always byte-for-byte equal to one of `options`.
    pub correct_answer: String,
    pub explanation: String,
}

/// Validated true/false item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrueFalseQuestion {
    pub question: String,
    pub correct_answer: bool,
    pub explanation: String,
}

/// Validated content for one unit, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub parent_id: String,
    pub sequence_number: u32,
    pub passage_a: String,
    pub passage_b: String,
    pub multiple_choice: MultipleChoiceQuestion,
    pub true_false: TrueFalseQuestion,
}

impl ContentRecord {
    pub fn key(&self) -> UnitKey {
        UnitKey::new(self.parent_id.clone(), self.sequence_number)
    }
}

/// A content record as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: Uuid,
    pub record: ContentRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn key(&self) -> UnitKey {
        self.record.key()
    }

    pub fn sequence_number(&self) -> u32 {
        self.record.sequence_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_question_kind_spellings() {
        assert_eq!(
            QuestionKind::from_declared("Multiple-Choice"),
            Some(QuestionKind::MultipleChoice)
        );
        assert_eq!(
            QuestionKind::from_declared("true/false"),
            Some(QuestionKind::TrueFalse)
        );
        assert_eq!(QuestionKind::from_declared("essay"), None);
    }

    #[test]
    fn test_candidate_tolerates_missing_fields() {
        let candidate: CandidateContent =
            serde_json::from_str(r#"{"passage_a": "text", "quiz": [{"kind": "true_false"}]}"#)
                .expect("lossy payload should still deserialize");

        assert_eq!(candidate.passage_a, "text");
        assert!(candidate.passage_b.is_empty());
        assert_eq!(candidate.quiz[0].kind, "true_false");
        assert!(candidate.quiz[0].correct_answer.is_none());
    }

    #[test]
    fn test_candidate_answer_untagged() {
        let q: CandidateQuestion =
            serde_json::from_str(r#"{"type": "true_false", "correct_answer": "true"}"#)
                .expect("valid question");
        assert_eq!(q.correct_answer, Some(CandidateAnswer::Text("true".into())));

        let q: CandidateQuestion =
            serde_json::from_str(r#"{"type": "true_false", "correct_answer": false}"#)
                .expect("valid question");
        assert_eq!(q.correct_answer, Some(CandidateAnswer::Bool(false)));
    }

    #[test]
    fn test_unit_defaults_and_key() {
        let unit: Unit = serde_json::from_str(
            r#"{"parent_id": "lecture-1", "sequence_number": 2, "title": "Limits"}"#,
        )
        .expect("valid unit");

        assert_eq!(unit.language_preference, "English");
        assert_eq!(unit.key(), UnitKey::new("lecture-1", 2));
        assert_eq!(unit.key().to_string(), "lecture-1#2");
    }
}
