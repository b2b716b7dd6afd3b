use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::db::types::{Presence, ProficiencyLevel};
use crate::services::errors::{ConfigurationError, ConsolidationError, KeyNotFoundError};
use crate::services::omr::DetectedResponse;
use crate::services::scoring::{
    essay_level_from_label, overall_average, overall_level, score_subjects, tally_detected,
    tally_imported, AnswerKeyCatalog, ImportedRawScores, LevelTable, Series, StudentSubjectScore,
    SubjectDefinition, TierRule,
};

/// Numeric 0-10 equivalents of the qualitative essay levels, supplied by the catalog.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct EssayScale {
    values: HashMap<ProficiencyLevel, f64>,
}

impl EssayScale {
    pub(crate) fn insert(&mut self, label: &str, value: f64) -> Result<(), ConfigurationError> {
        let level = essay_level_from_label(label)
            .filter(|_| value.is_finite() && (0.0..=10.0).contains(&value))
            .ok_or_else(|| ConfigurationError::InvalidEssayScale {
                label: label.to_string(),
                value,
            })?;
        self.values.insert(level, value);
        Ok(())
    }

    pub(crate) fn value_for(&self, level: ProficiencyLevel) -> Option<f64> {
        self.values.get(&level).copied()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Everything the pipeline reads from the catalog for one grade, validated once
/// and passed explicitly into every run.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CatalogSnapshot {
    grade: u8,
    tier: TierRule,
    subjects: Vec<SubjectDefinition>,
    answer_keys: AnswerKeyCatalog,
    levels: LevelTable,
    essay_scale: EssayScale,
}

impl CatalogSnapshot {
    pub(crate) fn new(
        grade: u8,
        mut subjects: Vec<SubjectDefinition>,
        answer_keys: AnswerKeyCatalog,
        levels: LevelTable,
        essay_scale: EssayScale,
    ) -> Result<Self, ConfigurationError> {
        let tier = TierRule::for_grade(grade)?;
        if subjects.is_empty() {
            return Err(ConfigurationError::MissingSubjects(grade));
        }
        SubjectDefinition::validate_set(grade, &subjects)?;
        subjects.sort_by_key(|definition| (definition.first_question, definition.subject));

        Ok(Self { grade, tier, subjects, answer_keys, levels, essay_scale })
    }

    pub(crate) fn grade(&self) -> u8 {
        self.grade
    }

    pub(crate) fn tier(&self) -> TierRule {
        self.tier
    }

    pub(crate) fn subjects(&self) -> &[SubjectDefinition] {
        &self.subjects
    }

    /// Number of sheet positions covered by assessed subjects.
    pub(crate) fn sheet_question_count(&self) -> u32 {
        self.subjects
            .iter()
            .filter(|definition| definition.is_assessed())
            .map(|definition| definition.first_question + definition.question_count - 1)
            .max()
            .unwrap_or(0)
    }
}

/// Where a student's correct counts come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub(crate) enum ScoreSource {
    Detected { responses: Vec<DetectedResponse> },
    Imported(ImportedRawScores),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(crate) struct EssayInput {
    pub(crate) label: Option<String>,
    pub(crate) score: Option<f64>,
}

impl EssayInput {
    pub(crate) fn is_empty(&self) -> bool {
        self.label.is_none() && self.score.is_none()
    }
}

/// The raw inputs behind a stored result, kept so a grade can be recomputed
/// after its catalog changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ConsolidationInputs {
    pub(crate) source: ScoreSource,
    #[serde(default)]
    pub(crate) essay: EssayInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StudentContext {
    pub(crate) student_id: String,
    pub(crate) ano_letivo: i32,
    pub(crate) serie: String,
    pub(crate) presence: Presence,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StudentConsolidatedResult {
    pub(crate) student_id: String,
    pub(crate) ano_letivo: i32,
    pub(crate) serie: String,
    pub(crate) grade: u8,
    pub(crate) presence: Presence,
    pub(crate) subject_scores: Vec<StudentSubjectScore>,
    pub(crate) essay_score: Option<f64>,
    pub(crate) essay_level: Option<ProficiencyLevel>,
    pub(crate) overall_average: Option<f64>,
    pub(crate) overall_level: Option<ProficiencyLevel>,
    pub(crate) excluded_questions: Vec<KeyNotFoundError>,
}

impl StudentConsolidatedResult {
    fn empty(student: &StudentContext, series: Series) -> Self {
        Self {
            student_id: student.student_id.clone(),
            ano_letivo: student.ano_letivo,
            serie: series.label,
            grade: series.grade,
            presence: student.presence,
            subject_scores: Vec::new(),
            essay_score: None,
            essay_level: None,
            overall_average: None,
            overall_level: None,
            excluded_questions: Vec::new(),
        }
    }
}

/// Computes a student's full consolidated result.
///
/// Pure: the same inputs always give the same result, and nothing is written.
/// A student who was not present gets a result with every derived field empty,
/// whatever the source carries.
pub(crate) fn consolidate(
    student: &StudentContext,
    source: &ScoreSource,
    essay: &EssayInput,
    snapshot: &CatalogSnapshot,
) -> Result<StudentConsolidatedResult, ConsolidationError> {
    let series = Series::parse(&student.serie)?;
    if series.grade != snapshot.grade {
        return Err(ConfigurationError::GradeMismatch {
            snapshot: snapshot.grade,
            student: series.grade,
        }
        .into());
    }

    let mut result = StudentConsolidatedResult::empty(student, series.clone());
    if !student.presence.is_present() {
        return Ok(result);
    }

    let tallies = match source {
        ScoreSource::Detected { responses } => {
            let tally =
                tally_detected(responses, &snapshot.subjects, &snapshot.answer_keys, &series);
            result.excluded_questions = tally.excluded_questions;
            tally.subjects
        }
        ScoreSource::Imported(raw) => tally_imported(raw, &snapshot.subjects, snapshot.grade)?,
    };

    result.subject_scores =
        score_subjects(&student.student_id, &tallies, snapshot.grade, &snapshot.levels);

    if snapshot.tier.includes_essay() {
        let (essay_score, essay_level) = resolve_essay(essay, &snapshot.essay_scale)?;
        result.essay_score = essay_score;
        result.essay_level = essay_level;
    } else if !essay.is_empty() {
        tracing::debug!(
            student_id = %student.student_id,
            grade = snapshot.grade,
            "Ignoring essay input for a grade without an essay component"
        );
    }

    result.overall_average =
        overall_average(snapshot.tier, &result.subject_scores, result.essay_score);

    let levels = result
        .subject_scores
        .iter()
        .filter_map(|score| score.proficiency_level)
        .chain(result.essay_level)
        .collect::<Vec<_>>();
    result.overall_level = overall_level(&levels);

    Ok(result)
}

fn resolve_essay(
    essay: &EssayInput,
    scale: &EssayScale,
) -> Result<(Option<f64>, Option<ProficiencyLevel>), ConsolidationError> {
    let level = essay
        .label
        .as_deref()
        .map(|label| {
            essay_level_from_label(label)
                .ok_or_else(|| ConsolidationError::UnknownEssayLabel(label.to_string()))
        })
        .transpose()?;

    let score = match essay.score {
        Some(score) if !score.is_finite() || !(0.0..=10.0).contains(&score) => {
            return Err(ConsolidationError::EssayScoreOutOfRange(score));
        }
        Some(score) => Some(score),
        None if level.is_some() && scale.is_empty() => {
            tracing::debug!("Essay scale is empty; the essay contributes its level only");
            None
        }
        None => level.and_then(|level| scale.value_for(level)),
    };

    Ok((score, level))
}
