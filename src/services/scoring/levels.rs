use std::collections::HashMap;

use crate::db::types::{ProficiencyLevel, SubjectCode};
use crate::services::errors::ConfigurationError;

/// Inclusive upper correct-count bound of N1, N2 and N3, plus the question count (N4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LevelBands {
    n1_max: u32,
    n2_max: u32,
    n3_max: u32,
    n4_max: u32,
}

impl LevelBands {
    pub(crate) fn new(
        subject: SubjectCode,
        grade: u8,
        n1_max: u32,
        n2_max: u32,
        n3_max: u32,
        n4_max: u32,
    ) -> Result<Self, ConfigurationError> {
        if !(n1_max < n2_max && n2_max < n3_max && n3_max < n4_max) {
            return Err(ConfigurationError::InvalidLevelBands {
                subject,
                grade,
                bands: [n1_max, n2_max, n3_max, n4_max],
            });
        }
        Ok(Self { n1_max, n2_max, n3_max, n4_max })
    }

    /// Quartile bands used when the catalog has no explicit table:
    /// N1 up to floor(q/4), N2 up to floor(q/2), N3 up to ceil(3q/4).
    pub(crate) fn for_question_count(question_count: u32) -> Self {
        Self {
            n1_max: question_count / 4,
            n2_max: question_count / 2,
            n3_max: (3 * question_count).div_ceil(4),
            n4_max: question_count,
        }
    }

    pub(crate) fn classify(&self, correct_count: u32) -> ProficiencyLevel {
        if correct_count <= self.n1_max {
            ProficiencyLevel::N1
        } else if correct_count <= self.n2_max {
            ProficiencyLevel::N2
        } else if correct_count <= self.n3_max {
            ProficiencyLevel::N3
        } else {
            ProficiencyLevel::N4
        }
    }

    pub(crate) fn as_array(&self) -> [u32; 4] {
        [self.n1_max, self.n2_max, self.n3_max, self.n4_max]
    }
}

/// Level thresholds keyed by (grade, subject); question counts differ per grade.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct LevelTable {
    bands: HashMap<(u8, SubjectCode), LevelBands>,
}

impl LevelTable {
    pub(crate) fn insert(&mut self, grade: u8, subject: SubjectCode, bands: LevelBands) {
        self.bands.insert((grade, subject), bands);
    }

    pub(crate) fn bands_for(
        &self,
        grade: u8,
        subject: SubjectCode,
        question_count: u32,
    ) -> LevelBands {
        self.bands
            .get(&(grade, subject))
            .copied()
            .unwrap_or_else(|| LevelBands::for_question_count(question_count))
    }

    pub(crate) fn classify(
        &self,
        grade: u8,
        subject: SubjectCode,
        question_count: u32,
        correct_count: u32,
    ) -> ProficiencyLevel {
        self.bands_for(grade, subject, question_count).classify(correct_count)
    }
}

/// Maps the qualitative essay grade onto N1..N4, ignoring case and accents.
pub(crate) fn essay_level_from_label(label: &str) -> Option<ProficiencyLevel> {
    let normalized = label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' => 'a',
            'é' | 'ê' => 'e',
            'í' => 'i',
            'ó' | 'ô' | 'õ' => 'o',
            'ú' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect::<String>();

    match normalized.as_str() {
        "insuficiente" => Some(ProficiencyLevel::N1),
        "basico" => Some(ProficiencyLevel::N2),
        "adequado" => Some(ProficiencyLevel::N3),
        "avancado" => Some(ProficiencyLevel::N4),
        _ => None,
    }
}

/// Mean of the numeric levels rounded half up; `None` when nothing was classified.
pub(crate) fn overall_level(levels: &[ProficiencyLevel]) -> Option<ProficiencyLevel> {
    if levels.is_empty() {
        return None;
    }

    let sum = levels.iter().map(|level| level.numeric()).sum::<u32>();
    let count = levels.len() as u32;
    ProficiencyLevel::from_numeric((2 * sum + count) / (2 * count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourteen_question_boundaries() {
        let bands = LevelBands::for_question_count(14);
        assert_eq!(bands.as_array(), [3, 7, 11, 14]);

        let expected = [
            (0, ProficiencyLevel::N1),
            (1, ProficiencyLevel::N1),
            (3, ProficiencyLevel::N1),
            (4, ProficiencyLevel::N2),
            (7, ProficiencyLevel::N2),
            (8, ProficiencyLevel::N3),
            (11, ProficiencyLevel::N3),
            (12, ProficiencyLevel::N4),
            (14, ProficiencyLevel::N4),
        ];
        for (correct, level) in expected {
            assert_eq!(bands.classify(correct), level, "{correct} correct of 14");
        }
    }

    #[test]
    fn twenty_question_boundaries() {
        let bands = LevelBands::for_question_count(20);
        assert_eq!(bands.as_array(), [5, 10, 15, 20]);
        assert_eq!(bands.classify(5), ProficiencyLevel::N1);
        assert_eq!(bands.classify(6), ProficiencyLevel::N2);
        assert_eq!(bands.classify(10), ProficiencyLevel::N2);
        assert_eq!(bands.classify(11), ProficiencyLevel::N3);
        assert_eq!(bands.classify(15), ProficiencyLevel::N3);
        assert_eq!(bands.classify(16), ProficiencyLevel::N4);
    }

    #[test]
    fn explicit_table_entry_overrides_derived_bands() {
        let mut table = LevelTable::default();
        let bands = LevelBands::new(SubjectCode::Mat, 5, 2, 6, 10, 14).expect("bands");
        table.insert(5, SubjectCode::Mat, bands);

        assert_eq!(table.classify(5, SubjectCode::Mat, 14, 3), ProficiencyLevel::N2);
        assert_eq!(table.classify(5, SubjectCode::Lp, 14, 3), ProficiencyLevel::N1);
        assert_eq!(table.classify(2, SubjectCode::Mat, 14, 3), ProficiencyLevel::N1);
    }

    #[test]
    fn non_increasing_bands_are_rejected() {
        let err = LevelBands::new(SubjectCode::Lp, 2, 3, 3, 11, 14).expect_err("bands");
        assert_eq!(
            err,
            ConfigurationError::InvalidLevelBands {
                subject: SubjectCode::Lp,
                grade: 2,
                bands: [3, 3, 11, 14],
            }
        );
    }

    #[test]
    fn essay_labels_map_one_to_one() {
        assert_eq!(essay_level_from_label("Insuficiente"), Some(ProficiencyLevel::N1));
        assert_eq!(essay_level_from_label("Básico"), Some(ProficiencyLevel::N2));
        assert_eq!(essay_level_from_label("basico"), Some(ProficiencyLevel::N2));
        assert_eq!(essay_level_from_label(" ADEQUADO "), Some(ProficiencyLevel::N3));
        assert_eq!(essay_level_from_label("Avançado"), Some(ProficiencyLevel::N4));
        assert_eq!(essay_level_from_label("Ótimo"), None);
    }

    #[test]
    fn overall_level_rounds_half_up() {
        use ProficiencyLevel::*;

        assert_eq!(overall_level(&[]), None);
        assert_eq!(overall_level(&[N3, N3, N3]), Some(N3));
        assert_eq!(overall_level(&[N2, N3]), Some(N3));
        assert_eq!(overall_level(&[N1, N2]), Some(N2));
        assert_eq!(overall_level(&[N1, N1, N2]), Some(N1));
        assert_eq!(overall_level(&[N1, N2, N2]), Some(N2));
        assert_eq!(overall_level(&[N4, N4, N3, N3]), Some(N4));
    }
}
