//! Content contract validation.
//!
//! Checks a generated [`CandidateContent`] against the structural contract a
//! unit's content must satisfy before it may be persisted:
//! - Both passages present, each within the word band
//! - Math notation only inside recognized math delimiters
//! - Quiz item 1 is a well-formed multiple-choice question whose answer is one
//!   of its options
//! - Quiz item 2 is a well-formed true/false question with a boolean answer
//!
//! Missing Markdown structure is reported as a warning only. The validator is
//! pure: it never coerces values, and it reports every violation it finds
//! rather than stopping at the first.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::notation::{has_math_delimiters, math_indicators, word_count, MarkupSignals};
use crate::content::{
    CandidateAnswer, CandidateContent, CandidateQuestion, ContentRecord, MultipleChoiceQuestion,
    PassageSlot, QuestionKind, TrueFalseQuestion, UnitKey,
};

/// Number of quiz items every unit carries.
pub const QUIZ_ITEM_COUNT: usize = 2;

/// Thresholds of the content contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRules {
    /// Minimum words per passage (inclusive).
    pub min_words: usize,
    /// Maximum words per passage (inclusive).
    pub max_words: usize,
    /// Minimum characters in a quiz question.
    pub min_question_chars: usize,
    /// Minimum characters in a quiz explanation.
    pub min_explanation_chars: usize,
}

impl Default for ContractRules {
    fn default() -> Self {
        Self {
            min_words: 300,
            max_words: 400,
            min_question_chars: 10,
            min_explanation_chars: 20,
        }
    }
}

/// A rule of the content contract that a candidate broke.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("{passage} is missing or empty")]
    MissingPassage { passage: PassageSlot },

    #[error("{passage} has {count} words, expected {min}-{max}")]
    WordCount {
        passage: PassageSlot,
        count: usize,
        min: usize,
        max: usize,
    },

    #[error("{passage} contains math notation ({}) without math delimiters", .indicators.join(", "))]
    UndelimitedMath {
        passage: PassageSlot,
        indicators: Vec<String>,
    },

    #[error("expected 2 quiz items, found {found}")]
    QuizItemCount { found: usize },

    #[error("quiz item {item} must be {expected}, declared '{declared}'")]
    WrongQuestionKind {
        item: usize,
        expected: QuestionKind,
        declared: String,
    },

    #[error("quiz item {item} question has {length} characters, expected at least {min}")]
    QuestionTooShort { item: usize, length: usize, min: usize },

    #[error("quiz item {item} explanation has {length} characters, expected at least {min}")]
    ExplanationTooShort { item: usize, length: usize, min: usize },

    #[error("quiz item {item} has {count} options, expected at least 2")]
    TooFewOptions { item: usize, count: usize },

    #[error("quiz item {item} correct answer '{answer}' is not one of its options")]
    AnswerNotInOptions { item: usize, answer: String },

    #[error("quiz item {item} has no correct answer")]
    MissingAnswer { item: usize },

    #[error("quiz item {item} correct answer is not a boolean")]
    AnswerNotBoolean { item: usize },
}

/// A soft finding that does not reject the candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractWarning {
    MissingMarkup { passage: PassageSlot },
}

impl fmt::Display for ContractWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractWarning::MissingMarkup { passage } => write!(
                f,
                "{} has no headings, lists or emphasis markers",
                passage
            ),
        }
    }
}

/// Outcome of checking one candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
    pub warnings: Vec<ContractWarning>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    fn violate(&mut self, violation: Violation) {
        self.violations.push(violation);
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.violations.is_empty() {
            return write!(f, "valid");
        }
        let messages: Vec<String> = self.violations.iter().map(ToString::to_string).collect();
        write!(f, "{}", messages.join("; "))
    }
}

/// Validator for generated unit content.
#[derive(Debug, Clone, Default)]
pub struct ContentValidator {
    rules: ContractRules,
}

impl ContentValidator {
    pub fn new(rules: ContractRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ContractRules {
        &self.rules
    }

    /// Checks a candidate and returns every violation and warning found.
    pub fn validate(&self, candidate: &CandidateContent) -> ValidationReport {
        self.evaluate(candidate).0
    }

    /// Checks a candidate and, if it satisfies the contract, turns it into the
    /// typed record for `key`.
    pub fn accept(
        &self,
        key: &UnitKey,
        candidate: &CandidateContent,
    ) -> Result<(ContentRecord, ValidationReport), ValidationReport> {
        match self.evaluate(candidate) {
            (report, Some((multiple_choice, true_false))) if report.is_valid() => Ok((
                ContentRecord {
                    parent_id: key.parent_id.clone(),
                    sequence_number: key.sequence_number,
                    passage_a: candidate.passage_a.clone(),
                    passage_b: candidate.passage_b.clone(),
                    multiple_choice,
                    true_false,
                },
                report,
            )),
            (report, _) => Err(report),
        }
    }

    fn evaluate(
        &self,
        candidate: &CandidateContent,
    ) -> (
        ValidationReport,
        Option<(MultipleChoiceQuestion, TrueFalseQuestion)>,
    ) {
        let mut report = ValidationReport::default();

        for slot in PassageSlot::ALL {
            self.check_passage(slot, candidate.passage(slot), &mut report);
        }

        if candidate.quiz.len() != QUIZ_ITEM_COUNT {
            report.violate(Violation::QuizItemCount {
                found: candidate.quiz.len(),
            });
        }

        let multiple_choice = candidate
            .quiz
            .first()
            .and_then(|q| self.check_multiple_choice(1, q, &mut report));
        let true_false = candidate
            .quiz
            .get(1)
            .and_then(|q| self.check_true_false(2, q, &mut report));

        (report, multiple_choice.zip(true_false))
    }

    fn check_passage(&self, slot: PassageSlot, text: &str, report: &mut ValidationReport) {
        if text.trim().is_empty() {
            report.violate(Violation::MissingPassage { passage: slot });
            return;
        }

        let count = word_count(text);
        if count < self.rules.min_words || count > self.rules.max_words {
            report.violate(Violation::WordCount {
                passage: slot,
                count,
                min: self.rules.min_words,
                max: self.rules.max_words,
            });
        }

        if !MarkupSignals::scan(text).any() {
            report
                .warnings
                .push(ContractWarning::MissingMarkup { passage: slot });
        }

        let indicators = math_indicators(text);
        if !indicators.is_empty() && !has_math_delimiters(text) {
            report.violate(Violation::UndelimitedMath {
                passage: slot,
                indicators: indicators.into_iter().map(String::from).collect(),
            });
        }
    }

    /// Checks the fields every quiz item shares; returns whether they passed.
    fn check_common(
        &self,
        item: usize,
        expected: QuestionKind,
        question: &CandidateQuestion,
        report: &mut ValidationReport,
    ) -> bool {
        let before = report.violations.len();

        if QuestionKind::from_declared(&question.kind) != Some(expected) {
            report.violate(Violation::WrongQuestionKind {
                item,
                expected,
                declared: question.kind.clone(),
            });
        }

        let length = question.question.trim().chars().count();
        if length < self.rules.min_question_chars {
            report.violate(Violation::QuestionTooShort {
                item,
                length,
                min: self.rules.min_question_chars,
            });
        }

        let length = question.explanation.trim().chars().count();
        if length < self.rules.min_explanation_chars {
            report.violate(Violation::ExplanationTooShort {
                item,
                length,
                min: self.rules.min_explanation_chars,
            });
        }

        report.violations.len() == before
    }

    fn check_multiple_choice(
        &self,
        item: usize,
        question: &CandidateQuestion,
        report: &mut ValidationReport,
    ) -> Option<MultipleChoiceQuestion> {
        let mut ok = self.check_common(item, QuestionKind::MultipleChoice, question, report);

        if question.options.len() < 2 {
            report.violate(Violation::TooFewOptions {
                item,
                count: question.options.len(),
            });
            ok = false;
        }

        let answer = match &question.correct_answer {
            Some(CandidateAnswer::Text(answer)) if question.options.contains(answer) => {
                Some(answer.clone())
            }
            Some(CandidateAnswer::Text(answer)) => {
                report.violate(Violation::AnswerNotInOptions {
                    item,
                    answer: answer.clone(),
                });
                None
            }
            Some(CandidateAnswer::Bool(answer)) => {
                report.violate(Violation::AnswerNotInOptions {
                    item,
                    answer: answer.to_string(),
                });
                None
            }
            None => {
                report.violate(Violation::MissingAnswer { item });
                None
            }
        };

        let correct_answer = answer.filter(|_| ok)?;
        Some(MultipleChoiceQuestion {
            question: question.question.clone(),
            options: question.options.clone(),
            correct_answer,
            explanation: question.explanation.clone(),
        })
    }

    fn check_true_false(
        &self,
        item: usize,
        question: &CandidateQuestion,
        report: &mut ValidationReport,
    ) -> Option<TrueFalseQuestion> {
        let ok = self.check_common(item, QuestionKind::TrueFalse, question, report);

        let answer = match &question.correct_answer {
            Some(CandidateAnswer::Bool(answer)) => Some(*answer),
            Some(CandidateAnswer::Text(_)) => {
                report.violate(Violation::AnswerNotBoolean { item });
                None
            }
            None => {
                report.violate(Violation::MissingAnswer { item });
                None
            }
        };

        let correct_answer = answer.filter(|_| ok)?;
        Some(TrueFalseQuestion {
            question: question.question.clone(),
            correct_answer,
            explanation: question.explanation.clone(),
        })
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A passage of exactly `words` words with Markdown structure.
    pub fn passage(words: usize) -> String {
        let mut text = String::from("## Overview\n\n");
        let body: Vec<&str> = std::iter::repeat("lorem").take(words.saturating_sub(2)).collect();
        text.push_str(&body.join(" "));
        text.push_str(" **end**");
        text
    }

    pub fn multiple_choice() -> CandidateQuestion {
        CandidateQuestion {
            kind: "multiple_choice".to_string(),
            question: "Which layer routes packets between networks?".to_string(),
            options: vec![
                "Physical".to_string(),
                "Network".to_string(),
                "Session".to_string(),
            ],
            correct_answer: Some(CandidateAnswer::Text("Network".to_string())),
            explanation: "The network layer handles routing across networks.".to_string(),
        }
    }

    pub fn true_false() -> CandidateQuestion {
        CandidateQuestion {
            kind: "true_false".to_string(),
            question: "TCP guarantees in-order delivery.".to_string(),
            options: Vec::new(),
            correct_answer: Some(CandidateAnswer::Bool(true)),
            explanation: "TCP reorders segments using sequence numbers.".to_string(),
        }
    }

    pub fn valid_candidate() -> CandidateContent {
        CandidateContent {
            passage_a: passage(320),
            passage_b: passage(380),
            quiz: vec![multiple_choice(), true_false()],
        }
    }
}
