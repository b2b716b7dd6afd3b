use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{Presence, ProficiencyLevel, ScanJobStatus, SubjectCode};
use crate::services::consolidation::{ConsolidationInputs, StudentConsolidatedResult};
use crate::services::errors::KeyNotFoundError;
use crate::services::scoring::StudentSubjectScore;

#[derive(Debug, Clone, FromRow)]
pub(crate) struct SubjectDefinitionRow {
    pub(crate) grade: i16,
    pub(crate) subject: SubjectCode,
    pub(crate) first_question: i32,
    pub(crate) question_count: i32,
}

/// `grade` is null for the question's default key.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct AnswerKeyRow {
    pub(crate) question_id: String,
    pub(crate) grade: Option<i16>,
    pub(crate) correct_alternative: String,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct LevelBandRow {
    pub(crate) grade: i16,
    pub(crate) subject: SubjectCode,
    pub(crate) n1_max: i32,
    pub(crate) n2_max: i32,
    pub(crate) n3_max: i32,
    pub(crate) n4_max: i32,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct EssayScaleRow {
    pub(crate) label: String,
    pub(crate) value: f64,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct SheetLayoutRow {
    pub(crate) grade: i16,
    pub(crate) questions_per_row: i32,
    pub(crate) x_start: f64,
    pub(crate) y_start: f64,
    pub(crate) col_spacing: f64,
    pub(crate) row_spacing: f64,
    pub(crate) bubble_y_offset: f64,
    pub(crate) bubble_spacing: f64,
    pub(crate) alternatives: String,
    pub(crate) question_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ScanJob {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) ano_letivo: i32,
    pub(crate) serie: String,
    pub(crate) presence: Presence,
    pub(crate) essay_label: Option<String>,
    pub(crate) essay_score: Option<f64>,
    pub(crate) image_sha256: String,
    pub(crate) status: ScanJobStatus,
    pub(crate) attempts: i32,
    pub(crate) error: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) started_at: Option<PrimitiveDateTime>,
    pub(crate) completed_at: Option<PrimitiveDateTime>,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct ConsolidatedResultRow {
    pub(crate) student_id: String,
    pub(crate) ano_letivo: i32,
    pub(crate) serie: String,
    pub(crate) grade: i16,
    pub(crate) presence: Presence,
    pub(crate) essay_score: Option<f64>,
    pub(crate) essay_level: Option<ProficiencyLevel>,
    pub(crate) overall_average: Option<f64>,
    pub(crate) overall_level: Option<ProficiencyLevel>,
    pub(crate) excluded_questions: Json<Vec<KeyNotFoundError>>,
    pub(crate) inputs: Json<ConsolidationInputs>,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct SubjectScoreRow {
    pub(crate) student_id: String,
    pub(crate) ano_letivo: i32,
    pub(crate) subject: SubjectCode,
    pub(crate) correct_count: i32,
    pub(crate) scaled_score: f64,
    pub(crate) proficiency_level: Option<ProficiencyLevel>,
}

impl ConsolidatedResultRow {
    /// Reassembles the domain result from the parent row and its subject rows.
    pub(crate) fn into_result(
        self,
        scores: Vec<SubjectScoreRow>,
    ) -> (StudentConsolidatedResult, ConsolidationInputs) {
        let subject_scores = scores
            .into_iter()
            .map(|row| StudentSubjectScore {
                student_id: row.student_id,
                subject: row.subject,
                correct_count: row.correct_count.max(0).unsigned_abs(),
                scaled_score: row.scaled_score,
                proficiency_level: row.proficiency_level,
            })
            .collect();

        let result = StudentConsolidatedResult {
            student_id: self.student_id,
            ano_letivo: self.ano_letivo,
            serie: self.serie,
            grade: u8::try_from(self.grade).unwrap_or_default(),
            presence: self.presence,
            subject_scores,
            essay_score: self.essay_score,
            essay_level: self.essay_level,
            overall_average: self.overall_average,
            overall_level: self.overall_level,
            excluded_questions: self.excluded_questions.0,
        };
        (result, self.inputs.0)
    }
}
