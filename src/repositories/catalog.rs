use sqlx::PgPool;

use crate::db::models::{
    AnswerKeyRow, EssayScaleRow, LevelBandRow, SheetLayoutRow, SubjectDefinitionRow,
};

pub(crate) async fn list_subject_definitions(
    pool: &PgPool,
    grade: i16,
) -> Result<Vec<SubjectDefinitionRow>, sqlx::Error> {
    sqlx::query_as::<_, SubjectDefinitionRow>(
        "SELECT grade, subject, first_question, question_count
         FROM subject_definitions
         WHERE grade = $1
         ORDER BY first_question, subject",
    )
    .bind(grade)
    .fetch_all(pool)
    .await
}

/// Default keys for every question plus the overrides of one grade.
pub(crate) async fn list_answer_keys(
    pool: &PgPool,
    grade: i16,
) -> Result<Vec<AnswerKeyRow>, sqlx::Error> {
    sqlx::query_as::<_, AnswerKeyRow>(
        "SELECT question_id, NULL::smallint AS grade, correct_alternative
         FROM answer_keys
         UNION ALL
         SELECT question_id, grade, correct_alternative
         FROM answer_key_overrides
         WHERE grade = $1",
    )
    .bind(grade)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_level_bands(
    pool: &PgPool,
    grade: i16,
) -> Result<Vec<LevelBandRow>, sqlx::Error> {
    sqlx::query_as::<_, LevelBandRow>(
        "SELECT grade, subject, n1_max, n2_max, n3_max, n4_max
         FROM level_bands
         WHERE grade = $1",
    )
    .bind(grade)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_essay_scale(pool: &PgPool) -> Result<Vec<EssayScaleRow>, sqlx::Error> {
    sqlx::query_as::<_, EssayScaleRow>("SELECT label, value FROM essay_scale ORDER BY value")
        .fetch_all(pool)
        .await
}

pub(crate) async fn find_sheet_layout(
    pool: &PgPool,
    grade: i16,
) -> Result<Option<SheetLayoutRow>, sqlx::Error> {
    sqlx::query_as::<_, SheetLayoutRow>(
        "SELECT grade, questions_per_row, x_start, y_start, col_spacing, row_spacing,
                bubble_y_offset, bubble_spacing, alternatives, question_ids
         FROM sheet_layouts
         WHERE grade = $1",
    )
    .bind(grade)
    .fetch_optional(pool)
    .await
}
