use sqlx::PgPool;

use crate::services::omr::DetectedResponse;

/// Stores the audit trail of one scan, replacing any earlier attempt.
pub(crate) async fn replace_for_job(
    pool: &PgPool,
    job_id: &str,
    responses: &[DetectedResponse],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM detected_responses WHERE job_id = $1")
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

    for response in responses {
        sqlx::query(
            "INSERT INTO detected_responses (
                job_id, question_number, question_id, alternative, confidence, ambiguous
             ) VALUES ($1,$2,$3,$4,$5,$6)",
        )
        .bind(job_id)
        .bind(response.question_number as i32)
        .bind(&response.question_id)
        .bind(response.alternative.map(String::from))
        .bind(response.confidence)
        .bind(response.ambiguous)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

pub(crate) async fn count_ambiguous_for_job(
    pool: &PgPool,
    job_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM detected_responses WHERE job_id = $1 AND ambiguous",
    )
    .bind(job_id)
    .fetch_one(pool)
    .await
}
