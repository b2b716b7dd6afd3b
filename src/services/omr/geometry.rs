use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::Alternative;
use crate::services::errors::ConfigurationError;

/// Printed layout of the answer grid, in pixels of the normalised scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct GridLayout {
    pub(crate) questions_per_row: u32,
    pub(crate) x_start: f64,
    pub(crate) y_start: f64,
    pub(crate) col_spacing: f64,
    pub(crate) row_spacing: f64,
    pub(crate) bubble_y_offset: f64,
    pub(crate) bubble_spacing: f64,
    pub(crate) alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct BubbleCoordinate {
    pub(crate) question_id: String,
    pub(crate) question_number: u32,
    pub(crate) alternative: Alternative,
    pub(crate) x: f64,
    pub(crate) y: f64,
}

impl GridLayout {
    pub(crate) fn validate(&self) -> Result<(), ConfigurationError> {
        if self.questions_per_row == 0 {
            return Err(ConfigurationError::NonPositive { field: "questions_per_row", value: 0.0 });
        }

        for (field, value) in [
            ("col_spacing", self.col_spacing),
            ("row_spacing", self.row_spacing),
            ("bubble_spacing", self.bubble_spacing),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigurationError::NonPositive { field, value });
            }
        }

        if self.alternatives.is_empty() {
            return Err(ConfigurationError::NoAlternatives);
        }

        let mut seen = HashSet::new();
        for alternative in &self.alternatives {
            if !seen.insert(*alternative) {
                return Err(ConfigurationError::DuplicateAlternative(*alternative));
            }
        }

        Ok(())
    }
}

/// Expected centre of every bubble, question-major in sheet order.
///
/// Question `i` (zero based) sits in row `i / questions_per_row` and column
/// `i % questions_per_row`; its alternatives are stacked downwards from
/// `bubble_y_offset`.
pub(crate) fn resolve_grid(
    question_ids: &[String],
    layout: &GridLayout,
) -> Result<Vec<BubbleCoordinate>, ConfigurationError> {
    if question_ids.is_empty() {
        return Err(ConfigurationError::NoQuestions);
    }
    layout.validate()?;

    let mut seen = HashSet::with_capacity(question_ids.len());
    for question_id in question_ids {
        if !seen.insert(question_id.as_str()) {
            return Err(ConfigurationError::DuplicateQuestion(question_id.clone()));
        }
    }

    let per_row = layout.questions_per_row as usize;
    let mut coordinates = Vec::with_capacity(question_ids.len() * layout.alternatives.len());

    for (index, question_id) in question_ids.iter().enumerate() {
        let row = (index / per_row) as f64;
        let col = (index % per_row) as f64;
        let x = layout.x_start + col * layout.col_spacing;
        let question_y = layout.y_start + row * layout.row_spacing;

        for (alt_index, alternative) in layout.alternatives.iter().enumerate() {
            coordinates.push(BubbleCoordinate {
                question_id: question_id.clone(),
                question_number: index as u32 + 1,
                alternative: *alternative,
                x,
                y: question_y + layout.bubble_y_offset + alt_index as f64 * layout.bubble_spacing,
            });
        }
    }

    Ok(coordinates)
}
