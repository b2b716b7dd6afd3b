mod answer_keys;
mod average;
mod levels;
mod subjects;
mod tiers;

pub(crate) use answer_keys::AnswerKeyCatalog;
pub(crate) use average::overall_average;
pub(crate) use levels::{essay_level_from_label, overall_level, LevelBands, LevelTable};
pub(crate) use subjects::{
    score_subjects, tally_detected, tally_imported, ImportedRawScores, StudentSubjectScore,
    SubjectDefinition,
};
pub(crate) use tiers::{Series, TierRule};

/// Rounds half away from zero to two decimals, the precision every score is stored with.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
