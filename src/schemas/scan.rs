use serde::Serialize;

use crate::core::time::format_primitive;
use crate::db::models::ScanJob;
use crate::db::types::{Presence, ScanJobStatus};

#[derive(Debug, Serialize)]
pub(crate) struct ScanJobResponse {
    pub(crate) id: String,
    pub(crate) student_id: String,
    pub(crate) ano_letivo: i32,
    pub(crate) serie: String,
    pub(crate) presence: Presence,
    pub(crate) status: ScanJobStatus,
    pub(crate) attempts: i32,
    pub(crate) error: Option<String>,
    pub(crate) ambiguous_questions: i64,
    pub(crate) image_sha256: String,
    pub(crate) created_at: String,
    pub(crate) started_at: Option<String>,
    pub(crate) completed_at: Option<String>,
}

impl ScanJobResponse {
    pub(crate) fn from_job(job: ScanJob, ambiguous_questions: i64) -> Self {
        Self {
            id: job.id,
            student_id: job.student_id,
            ano_letivo: job.ano_letivo,
            serie: job.serie,
            presence: job.presence,
            status: job.status,
            attempts: job.attempts,
            error: job.error,
            ambiguous_questions,
            image_sha256: job.image_sha256,
            created_at: format_primitive(job.created_at),
            started_at: job.started_at.map(format_primitive),
            completed_at: job.completed_at.map(format_primitive),
        }
    }
}
