//! Content data model.
//!
//! A [`Unit`] is one segment of a parent resource (a lecture) that needs
//! content. The generator produces an untrusted [`CandidateContent`]; once it
//! passes the content contract it becomes a typed [`ContentRecord`], and the
//! store hands back a [`StoredRecord`] after persisting it.

pub mod types;

pub use types::{
    CandidateAnswer, CandidateContent, CandidateQuestion, ContentRecord, MultipleChoiceQuestion,
    PassageSlot, QuestionKind, StoredRecord, TrueFalseQuestion, Unit, UnitKey,
};
