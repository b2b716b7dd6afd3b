use sqlx::PgPool;

use crate::db::models::{
    AnswerKeyRow, EssayScaleRow, LevelBandRow, SheetLayoutRow, SubjectDefinitionRow,
};
use crate::repositories;
use crate::services::consolidation::{CatalogSnapshot, EssayScale};
use crate::services::errors::{CatalogError, ConfigurationError};
use crate::services::omr::{Alternative, GridLayout};
use crate::services::scoring::{AnswerKeyCatalog, LevelBands, LevelTable, SubjectDefinition};

/// The printed grid of a grade and the question ids in sheet order.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SheetLayout {
    pub(crate) layout: GridLayout,
    pub(crate) question_ids: Vec<String>,
}

pub(crate) async fn load_snapshot(
    pool: &PgPool,
    grade: u8,
) -> Result<CatalogSnapshot, CatalogError> {
    let key = i16::from(grade);
    let subjects = repositories::catalog::list_subject_definitions(pool, key).await?;
    let keys = repositories::catalog::list_answer_keys(pool, key).await?;
    let bands = repositories::catalog::list_level_bands(pool, key).await?;
    let scale = repositories::catalog::list_essay_scale(pool).await?;

    let snapshot = snapshot_from_rows(grade, subjects, keys, bands, scale)?;
    tracing::debug!(grade, subjects = snapshot.subjects().len(), "Loaded catalog snapshot");
    Ok(snapshot)
}

pub(crate) async fn load_sheet_layout(
    pool: &PgPool,
    grade: u8,
) -> Result<SheetLayout, CatalogError> {
    let row = repositories::catalog::find_sheet_layout(pool, i16::from(grade))
        .await?
        .ok_or(ConfigurationError::MissingLayout(grade))?;
    Ok(layout_from_row(row)?)
}

pub(crate) fn snapshot_from_rows(
    grade: u8,
    subjects: Vec<SubjectDefinitionRow>,
    keys: Vec<AnswerKeyRow>,
    bands: Vec<LevelBandRow>,
    scale: Vec<EssayScaleRow>,
) -> Result<CatalogSnapshot, ConfigurationError> {
    let definitions = subjects
        .into_iter()
        .map(|row| {
            let invalid =
                || ConfigurationError::InvalidQuestionRange { subject: row.subject, grade };
            Ok(SubjectDefinition {
                subject: row.subject,
                grade,
                first_question: u32::try_from(row.first_question).map_err(|_| invalid())?,
                question_count: u32::try_from(row.question_count).map_err(|_| invalid())?,
            })
        })
        .collect::<Result<Vec<_>, ConfigurationError>>()?;

    let mut answer_keys = AnswerKeyCatalog::default();
    for row in keys {
        let key = Alternative::parse(&row.correct_alternative).ok_or_else(|| {
            ConfigurationError::InvalidAnswerKey {
                question_id: row.question_id.clone(),
                value: row.correct_alternative.clone(),
            }
        })?;
        match row.grade {
            Some(_) => answer_keys.insert_override(row.question_id, grade, key),
            None => answer_keys.insert_default(row.question_id, key),
        }
    }

    let mut levels = LevelTable::default();
    for row in bands {
        let values = [row.n1_max, row.n2_max, row.n3_max, row.n4_max];
        let converted = values.map(|value| u32::try_from(value).ok());
        let [Some(n1), Some(n2), Some(n3), Some(n4)] = converted else {
            return Err(ConfigurationError::InvalidLevelBands {
                subject: row.subject,
                grade,
                bands: values.map(|value| value.max(0).unsigned_abs()),
            });
        };
        let band = LevelBands::new(row.subject, grade, n1, n2, n3, n4)?;
        levels.insert(grade, row.subject, band);
    }

    let mut essay_scale = EssayScale::default();
    for row in scale {
        essay_scale.insert(&row.label, row.value)?;
    }

    if answer_keys.is_empty() {
        tracing::warn!(grade, "No answer keys configured; every detected question is excluded");
    }
    CatalogSnapshot::new(grade, definitions, answer_keys, levels, essay_scale)
}

pub(crate) fn layout_from_row(row: SheetLayoutRow) -> Result<SheetLayout, ConfigurationError> {
    let questions_per_row = u32::try_from(row.questions_per_row).map_err(|_| {
        ConfigurationError::NonPositive {
            field: "questions_per_row",
            value: f64::from(row.questions_per_row),
        }
    })?;

    let alternatives = row
        .alternatives
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .map(|c| {
            Alternative::parse(&c.to_string())
                .ok_or_else(|| ConfigurationError::InvalidAlternative(c.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let layout = GridLayout {
        questions_per_row,
        x_start: row.x_start,
        y_start: row.y_start,
        col_spacing: row.col_spacing,
        row_spacing: row.row_spacing,
        bubble_y_offset: row.bubble_y_offset,
        bubble_spacing: row.bubble_spacing,
        alternatives,
    };
    layout.validate()?;
    if row.question_ids.is_empty() {
        return Err(ConfigurationError::NoQuestions);
    }

    Ok(SheetLayout { layout, question_ids: row.question_ids })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::SubjectCode;

    fn subject_row(
        subject: SubjectCode,
        first_question: i32,
        question_count: i32,
    ) -> SubjectDefinitionRow {
        SubjectDefinitionRow { grade: 3, subject, first_question, question_count }
    }

    fn key_row(question_id: &str, grade: Option<i16>, letter: &str) -> AnswerKeyRow {
        AnswerKeyRow {
            question_id: question_id.to_string(),
            grade,
            correct_alternative: letter.to_string(),
        }
    }

    fn layout_row(alternatives: &str) -> SheetLayoutRow {
        SheetLayoutRow {
            grade: 3,
            questions_per_row: 2,
            x_start: 20.0,
            y_start: 20.0,
            col_spacing: 100.0,
            row_spacing: 80.0,
            bubble_y_offset: 0.0,
            bubble_spacing: 15.0,
            alternatives: alternatives.to_string(),
            question_ids: vec!["Q1".to_string(), "Q2".to_string()],
        }
    }

    #[test]
    fn rows_build_a_validated_snapshot() {
        let snapshot = snapshot_from_rows(
            3,
            vec![subject_row(SubjectCode::Mat, 15, 14), subject_row(SubjectCode::Lp, 1, 14)],
            vec![key_row("Q1", None, "a"), key_row("Q1", Some(3), "C")],
            vec![LevelBandRow {
                grade: 3,
                subject: SubjectCode::Lp,
                n1_max: 3,
                n2_max: 7,
                n3_max: 11,
                n4_max: 14,
            }],
            vec![EssayScaleRow { label: "Adequado".to_string(), value: 7.5 }],
        )
        .expect("snapshot");

        assert_eq!(snapshot.grade(), 3);
        assert_eq!(snapshot.subjects()[0].subject, SubjectCode::Lp);
        assert_eq!(snapshot.sheet_question_count(), 28);
    }

    #[test]
    fn bad_rows_surface_as_configuration_errors() {
        let negative = snapshot_from_rows(
            3,
            vec![subject_row(SubjectCode::Lp, 1, -2)],
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(
            negative,
            Err(ConfigurationError::InvalidQuestionRange { subject: SubjectCode::Lp, grade: 3 })
        );

        let bad_key = snapshot_from_rows(
            3,
            vec![subject_row(SubjectCode::Lp, 1, 2)],
            vec![key_row("Q2", None, "AB")],
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(
            bad_key,
            Err(ConfigurationError::InvalidAnswerKey {
                question_id: "Q2".to_string(),
                value: "AB".to_string(),
            })
        );

        let bad_scale = snapshot_from_rows(
            3,
            vec![subject_row(SubjectCode::Lp, 1, 2)],
            Vec::new(),
            Vec::new(),
            vec![EssayScaleRow { label: "Ótimo".to_string(), value: 9.0 }],
        );
        assert!(matches!(bad_scale, Err(ConfigurationError::InvalidEssayScale { .. })));
    }

    #[test]
    fn layout_rows_accept_plain_or_comma_separated_letters() {
        let plain = layout_from_row(layout_row("ABCD")).expect("layout");
        let separated = layout_from_row(layout_row("A, B, C, D")).expect("layout");

        assert_eq!(plain, separated);
        assert_eq!(plain.layout.alternatives.len(), 4);
        assert_eq!(plain.question_ids, vec!["Q1".to_string(), "Q2".to_string()]);
    }

    #[test]
    fn layout_rows_reject_duplicate_or_invalid_letters() {
        assert_eq!(
            layout_from_row(layout_row("ABA")),
            Err(ConfigurationError::DuplicateAlternative(Alternative::parse("A").expect("A")))
        );
        assert_eq!(
            layout_from_row(layout_row("AB3")),
            Err(ConfigurationError::InvalidAlternative("3".to_string()))
        );
    }
}
