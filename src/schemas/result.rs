use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::types::{Presence, ProficiencyLevel, SubjectCode};
use crate::services::consolidation::{EssayInput, StudentConsolidatedResult, StudentContext};
use crate::services::scoring::{ImportedRawScores, StudentSubjectScore};

/// One row of a raw-score import: correct answers per subject instead of a sheet.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ImportResultRequest {
    #[validate(length(min = 1, max = 64, message = "student_id must be 1-64 characters"))]
    pub(crate) student_id: String,
    #[validate(range(min = 2000, max = 2100, message = "ano_letivo is out of range"))]
    pub(crate) ano_letivo: i32,
    #[validate(length(min = 1, message = "serie must not be empty"))]
    pub(crate) serie: String,
    pub(crate) presence: Presence,
    #[serde(default)]
    pub(crate) correct_counts: BTreeMap<SubjectCode, u32>,
    #[serde(default)]
    pub(crate) essay_label: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 10.0, message = "essay_score must be between 0 and 10"))]
    pub(crate) essay_score: Option<f64>,
}

impl ImportResultRequest {
    pub(crate) fn context(&self) -> StudentContext {
        StudentContext {
            student_id: self.student_id.clone(),
            ano_letivo: self.ano_letivo,
            serie: self.serie.clone(),
            presence: self.presence,
        }
    }

    pub(crate) fn raw_scores(&self) -> ImportedRawScores {
        ImportedRawScores { correct_counts: self.correct_counts.clone() }
    }

    pub(crate) fn essay(&self) -> EssayInput {
        EssayInput { label: self.essay_label.clone(), score: self.essay_score }
    }
}

/// Recompute every stored student of a grade, for example after a key fix.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ReprocessRequest {
    #[validate(range(min = 1, max = 12, message = "grade is out of range"))]
    pub(crate) grade: u8,
    #[validate(range(min = 2000, max = 2100, message = "ano_letivo is out of range"))]
    pub(crate) ano_letivo: i32,
}

/// Flat export shape handed to reporting. A subject that was not assessed is
/// left out of the JSON entirely rather than reported as zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ConsolidatedRecord {
    pub(crate) student_id: String,
    pub(crate) ano_letivo: i32,
    pub(crate) serie: String,
    pub(crate) presenca: Presence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) nota_lp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) nota_mat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) nota_ch: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) nota_cn: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) nota_producao: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) total_acertos_lp: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) total_acertos_mat: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) total_acertos_ch: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) total_acertos_cn: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) nivel_lp: Option<ProficiencyLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) nivel_mat: Option<ProficiencyLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) nivel_prod: Option<ProficiencyLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) nivel_aluno: Option<ProficiencyLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) media_aluno: Option<f64>,
}

impl From<&StudentConsolidatedResult> for ConsolidatedRecord {
    fn from(result: &StudentConsolidatedResult) -> Self {
        let find = |subject: SubjectCode| -> Option<&StudentSubjectScore> {
            result.subject_scores.iter().find(|score| score.subject == subject)
        };
        let lp = find(SubjectCode::Lp);
        let mat = find(SubjectCode::Mat);
        let ch = find(SubjectCode::Ch);
        let cn = find(SubjectCode::Cn);

        Self {
            student_id: result.student_id.clone(),
            ano_letivo: result.ano_letivo,
            serie: result.serie.clone(),
            presenca: result.presence,
            nota_lp: lp.map(|score| score.scaled_score),
            nota_mat: mat.map(|score| score.scaled_score),
            nota_ch: ch.map(|score| score.scaled_score),
            nota_cn: cn.map(|score| score.scaled_score),
            nota_producao: result.essay_score,
            total_acertos_lp: lp.map(|score| score.correct_count),
            total_acertos_mat: mat.map(|score| score.correct_count),
            total_acertos_ch: ch.map(|score| score.correct_count),
            total_acertos_cn: cn.map(|score| score.correct_count),
            nivel_lp: lp.and_then(|score| score.proficiency_level),
            nivel_mat: mat.and_then(|score| score.proficiency_level),
            nivel_prod: result.essay_level,
            nivel_aluno: result.overall_level,
            media_aluno: result.overall_average,
        }
    }
}
