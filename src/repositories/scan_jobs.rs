use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::ScanJob;
use crate::db::types::{Presence, ScanJobStatus};

pub(crate) const COLUMNS: &str = "\
    id, student_id, ano_letivo, serie, presence, essay_label, essay_score, image_sha256, \
    status, attempts, error, created_at, started_at, completed_at, updated_at";

pub(crate) struct CreateScanJob<'a> {
    pub(crate) id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) ano_letivo: i32,
    pub(crate) serie: &'a str,
    pub(crate) presence: Presence,
    pub(crate) essay_label: Option<&'a str>,
    pub(crate) essay_score: Option<f64>,
    pub(crate) image: &'a [u8],
    pub(crate) image_sha256: &'a str,
    pub(crate) created_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateScanJob<'_>,
) -> Result<ScanJob, sqlx::Error> {
    sqlx::query_as::<_, ScanJob>(&format!(
        "INSERT INTO scan_jobs (
            id, student_id, ano_letivo, serie, presence, essay_label, essay_score, image,
            image_sha256, status, attempts, created_at, updated_at
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,0,$11,$11)
         RETURNING {COLUMNS}"
    ))
    .bind(params.id)
    .bind(params.student_id)
    .bind(params.ano_letivo)
    .bind(params.serie)
    .bind(params.presence)
    .bind(params.essay_label)
    .bind(params.essay_score)
    .bind(params.image)
    .bind(params.image_sha256)
    .bind(ScanJobStatus::Queued)
    .bind(params.created_at)
    .fetch_one(pool)
    .await
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<ScanJob>, sqlx::Error> {
    sqlx::query_as::<_, ScanJob>(&format!("SELECT {COLUMNS} FROM scan_jobs WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Moves the oldest queued job to `processing`. Concurrent workers skip rows
/// another worker has locked, so a job is handed out once.
pub(crate) async fn claim_next(
    pool: &PgPool,
    now: PrimitiveDateTime,
) -> Result<Option<ScanJob>, sqlx::Error> {
    sqlx::query_as::<_, ScanJob>(&format!(
        "WITH candidate AS (
            SELECT id AS candidate_id FROM scan_jobs
            WHERE status = $1
            ORDER BY created_at
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        UPDATE scan_jobs
        SET status = $2,
            attempts = attempts + 1,
            started_at = $3,
            error = NULL,
            updated_at = $3
        FROM candidate
        WHERE scan_jobs.id = candidate.candidate_id
        RETURNING {COLUMNS}"
    ))
    .bind(ScanJobStatus::Queued)
    .bind(ScanJobStatus::Processing)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn load_image(pool: &PgPool, id: &str) -> Result<Option<Vec<u8>>, sqlx::Error> {
    sqlx::query_scalar::<_, Vec<u8>>("SELECT image FROM scan_jobs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Completes the job if it is still the claim numbered `attempt`. Returns
/// `false` when the stale requeue has since handed it to another worker.
pub(crate) async fn mark_completed(
    pool: &PgPool,
    id: &str,
    attempt: i32,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE scan_jobs
         SET status = $1, error = NULL, completed_at = $2, updated_at = $2
         WHERE id = $3
           AND status = $4
           AND attempts = $5",
    )
    .bind(ScanJobStatus::Completed)
    .bind(now)
    .bind(id)
    .bind(ScanJobStatus::Processing)
    .bind(attempt)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(updated > 0)
}

pub(crate) async fn mark_failed(
    pool: &PgPool,
    id: &str,
    attempt: i32,
    error: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE scan_jobs
         SET status = $1, error = $2, completed_at = $3, updated_at = $3
         WHERE id = $4
           AND status = $5
           AND attempts = $6",
    )
    .bind(ScanJobStatus::Failed)
    .bind(error)
    .bind(now)
    .bind(id)
    .bind(ScanJobStatus::Processing)
    .bind(attempt)
    .execute(pool)
    .await?
    .rows_affected();
    Ok(updated > 0)
}

/// Puts jobs whose worker vanished back in the queue, up to `max_attempts`;
/// beyond that they are failed.
pub(crate) async fn requeue_stale(
    pool: &PgPool,
    started_before: PrimitiveDateTime,
    max_attempts: i32,
    now: PrimitiveDateTime,
) -> Result<(u64, u64), sqlx::Error> {
    let requeued = sqlx::query(
        "UPDATE scan_jobs
         SET status = $1, started_at = NULL, updated_at = $2
         WHERE status = $3
           AND started_at < $4
           AND attempts < $5",
    )
    .bind(ScanJobStatus::Queued)
    .bind(now)
    .bind(ScanJobStatus::Processing)
    .bind(started_before)
    .bind(max_attempts)
    .execute(pool)
    .await?
    .rows_affected();

    let failed = sqlx::query(
        "UPDATE scan_jobs
         SET status = $1,
             error = 'Scan worker stopped responding too many times',
             completed_at = $2,
             updated_at = $2
         WHERE status = $3
           AND started_at < $4
           AND attempts >= $5",
    )
    .bind(ScanJobStatus::Failed)
    .bind(now)
    .bind(ScanJobStatus::Processing)
    .bind(started_before)
    .bind(max_attempts)
    .execute(pool)
    .await?
    .rows_affected();

    Ok((requeued, failed))
}
