use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use time::PrimitiveDateTime;

use crate::db::models::{ConsolidatedResultRow, SubjectScoreRow};
use crate::services::consolidation::{ConsolidationInputs, StudentConsolidatedResult};

const RESULT_COLUMNS: &str = "\
    student_id, ano_letivo, serie, grade, presence, essay_score, essay_level, \
    overall_average, overall_level, excluded_questions, inputs, updated_at";

const SCORE_COLUMNS: &str =
    "student_id, ano_letivo, subject, correct_count, scaled_score, proficiency_level";

/// Replaces the parent row and every subject row of one student in a single
/// transaction. Writers for the same (student, year) queue on an advisory lock
/// held until commit or rollback.
pub(crate) async fn replace(
    pool: &PgPool,
    result: &StudentConsolidatedResult,
    inputs: &ConsolidationInputs,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    lock_student(&mut tx, result).await?;
    write_rows(&mut tx, result, inputs, now).await?;
    tx.commit().await?;
    Ok(())
}

/// Same as [`replace`], but only while the stored inputs still equal `inputs`.
/// Returns `false` without writing when the row is gone or another writer
/// stored different inputs since they were read.
pub(crate) async fn replace_if_inputs_unchanged(
    pool: &PgPool,
    result: &StudentConsolidatedResult,
    inputs: &ConsolidationInputs,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;
    lock_student(&mut tx, result).await?;

    let unchanged = sqlx::query_scalar::<_, bool>(
        "SELECT inputs = $3 FROM consolidated_results
         WHERE student_id = $1 AND ano_letivo = $2",
    )
    .bind(&result.student_id)
    .bind(result.ano_letivo)
    .bind(Json(inputs))
    .fetch_optional(&mut *tx)
    .await?
    .unwrap_or(false);

    if !unchanged {
        tx.rollback().await?;
        return Ok(false);
    }

    write_rows(&mut tx, result, inputs, now).await?;
    tx.commit().await?;
    Ok(true)
}

async fn lock_student(
    tx: &mut Transaction<'_, Postgres>,
    result: &StudentConsolidatedResult,
) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
        .bind(format!("consolidated:{}:{}", result.student_id, result.ano_letivo))
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn write_rows(
    tx: &mut Transaction<'_, Postgres>,
    result: &StudentConsolidatedResult,
    inputs: &ConsolidationInputs,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "DELETE FROM student_subject_scores
         WHERE student_id = $1
           AND ano_letivo = $2",
    )
    .bind(&result.student_id)
    .bind(result.ano_letivo)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        "INSERT INTO consolidated_results (
            student_id, ano_letivo, serie, grade, presence, essay_score, essay_level,
            overall_average, overall_level, excluded_questions, inputs, updated_at
         ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
         ON CONFLICT (student_id, ano_letivo) DO UPDATE
             SET serie = EXCLUDED.serie,
                 grade = EXCLUDED.grade,
                 presence = EXCLUDED.presence,
                 essay_score = EXCLUDED.essay_score,
                 essay_level = EXCLUDED.essay_level,
                 overall_average = EXCLUDED.overall_average,
                 overall_level = EXCLUDED.overall_level,
                 excluded_questions = EXCLUDED.excluded_questions,
                 inputs = EXCLUDED.inputs,
                 updated_at = EXCLUDED.updated_at",
    )
    .bind(&result.student_id)
    .bind(result.ano_letivo)
    .bind(&result.serie)
    .bind(i16::from(result.grade))
    .bind(result.presence)
    .bind(result.essay_score)
    .bind(result.essay_level)
    .bind(result.overall_average)
    .bind(result.overall_level)
    .bind(Json(&result.excluded_questions))
    .bind(Json(inputs))
    .bind(now)
    .execute(&mut **tx)
    .await?;

    for score in &result.subject_scores {
        sqlx::query(
            "INSERT INTO student_subject_scores (
                student_id, ano_letivo, subject, correct_count, scaled_score, proficiency_level
             ) VALUES ($1,$2,$3,$4,$5,$6)",
        )
        .bind(&result.student_id)
        .bind(result.ano_letivo)
        .bind(score.subject)
        .bind(score.correct_count as i32)
        .bind(score.scaled_score)
        .bind(score.proficiency_level)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Reads a result and its subject rows from one snapshot, so a concurrent
/// replace is seen either entirely or not at all.
pub(crate) async fn find(
    pool: &PgPool,
    student_id: &str,
    ano_letivo: i32,
) -> Result<Option<(ConsolidatedResultRow, Vec<SubjectScoreRow>)>, sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(&mut *tx)
        .await?;

    let Some(row) = sqlx::query_as::<_, ConsolidatedResultRow>(&format!(
        "SELECT {RESULT_COLUMNS} FROM consolidated_results
         WHERE student_id = $1 AND ano_letivo = $2"
    ))
    .bind(student_id)
    .bind(ano_letivo)
    .fetch_optional(&mut *tx)
    .await?
    else {
        tx.commit().await?;
        return Ok(None);
    };

    let scores = sqlx::query_as::<_, SubjectScoreRow>(&format!(
        "SELECT {SCORE_COLUMNS} FROM student_subject_scores
         WHERE student_id = $1 AND ano_letivo = $2
         ORDER BY subject"
    ))
    .bind(student_id)
    .bind(ano_letivo)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some((row, scores)))
}

/// Results of one grade and year, used when the grade is recomputed.
pub(crate) async fn list_for_grade(
    pool: &PgPool,
    grade: i16,
    ano_letivo: i32,
) -> Result<Vec<ConsolidatedResultRow>, sqlx::Error> {
    sqlx::query_as::<_, ConsolidatedResultRow>(&format!(
        "SELECT {RESULT_COLUMNS} FROM consolidated_results
         WHERE grade = $1 AND ano_letivo = $2
         ORDER BY student_id"
    ))
    .bind(grade)
    .bind(ano_letivo)
    .fetch_all(pool)
    .await
}
