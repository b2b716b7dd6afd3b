use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::types::SubjectCode;
use crate::services::omr::Alternative;

/// Malformed geometry or catalog data. Fatal for the whole batch and never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub(crate) enum ConfigurationError {
    #[error("sheet layout has no questions")]
    NoQuestions,
    #[error("sheet layout field {field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("sheet layout has no alternatives")]
    NoAlternatives,
    #[error("sheet layout lists alternative {0} more than once")]
    DuplicateAlternative(Alternative),
    #[error("'{0}' is not a single alternative letter")]
    InvalidAlternative(String),
    #[error("answer key for question {question_id} is not a single letter: '{value}'")]
    InvalidAnswerKey { question_id: String, value: String },
    #[error("sheet layout lists question {0} more than once")]
    DuplicateQuestion(String),
    #[error("cannot read a grade from series label '{0}'")]
    UnreadableSeries(String),
    #[error("grade {0} belongs to no scoring tier (expected 2, 3, 5 or 6-9)")]
    UnsupportedGrade(u8),
    #[error("no subject configuration for grade {0}")]
    MissingSubjects(u8),
    #[error("no sheet layout configured for grade {0}")]
    MissingLayout(u8),
    #[error("subject {subject} is configured twice for grade {grade}")]
    DuplicateSubject { subject: SubjectCode, grade: u8 },
    #[error("subject {subject} for grade {grade} must start at question 1 or later")]
    InvalidQuestionRange { subject: SubjectCode, grade: u8 },
    #[error("subjects {first} and {second} share questions for grade {grade}")]
    OverlappingSubjects { first: SubjectCode, second: SubjectCode, grade: u8 },
    #[error("level bands for {subject} grade {grade} are not increasing: {bands:?}")]
    InvalidLevelBands { subject: SubjectCode, grade: u8, bands: [u32; 4] },
    #[error("essay scale entry {label} = {value} is not a known level with a 0-10 value")]
    InvalidEssayScale { label: String, value: f64 },
    #[error("catalog snapshot is for grade {snapshot} but the student is in grade {student}")]
    GradeMismatch { snapshot: u8, student: u8 },
}

#[derive(Debug, Error)]
pub(crate) enum CatalogError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("catalog query failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// No answer key resolves for a question. Excludes only that question from scoring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("no answer key for question {question_id} (series {serie})")]
pub(crate) struct KeyNotFoundError {
    pub(crate) question_id: String,
    pub(crate) question_number: u32,
    pub(crate) serie: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub(crate) enum ConsolidationError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("imported {subject} count {correct} exceeds its {question_count} questions")]
    ImportedCountOutOfRange { subject: SubjectCode, correct: u32, question_count: u32 },
    #[error("imported {subject} score but the subject is not assessed for grade {grade}")]
    ImportedUnassessedSubject { subject: SubjectCode, grade: u8 },
    #[error("unknown essay level '{0}'")]
    UnknownEssayLabel(String),
    #[error("essay score {0} is outside 0-10")]
    EssayScoreOutOfRange(f64),
}

/// Storage failure during a consolidated write. The transaction was rolled back;
/// the caller retries the whole student.
#[derive(Debug, Error)]
pub(crate) enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("result store unavailable: {0}")]
    Unavailable(String),
}
