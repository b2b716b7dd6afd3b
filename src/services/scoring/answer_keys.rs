use std::collections::HashMap;

use crate::services::errors::KeyNotFoundError;
use crate::services::omr::Alternative;

use super::Series;

/// Correct alternatives per question, with per-grade overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct AnswerKeyCatalog {
    defaults: HashMap<String, Alternative>,
    overrides: HashMap<(String, u8), Alternative>,
}

impl AnswerKeyCatalog {
    pub(crate) fn insert_default(&mut self, question_id: impl Into<String>, key: Alternative) {
        self.defaults.insert(question_id.into(), key);
    }

    pub(crate) fn insert_override(
        &mut self,
        question_id: impl Into<String>,
        grade: u8,
        key: Alternative,
    ) {
        self.overrides.insert((question_id.into(), grade), key);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.defaults.is_empty() && self.overrides.is_empty()
    }

    /// Series override first, then the question's default key.
    pub(crate) fn resolve(
        &self,
        question_id: &str,
        question_number: u32,
        series: &Series,
    ) -> Result<Alternative, KeyNotFoundError> {
        self.overrides
            .get(&(question_id.to_string(), series.grade))
            .or_else(|| self.defaults.get(question_id))
            .copied()
            .ok_or_else(|| KeyNotFoundError {
                question_id: question_id.to_string(),
                question_number,
                serie: series.label.clone(),
            })
    }
}
