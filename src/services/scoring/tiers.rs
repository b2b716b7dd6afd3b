use serde::Serialize;

use crate::db::types::SubjectCode;
use crate::services::errors::ConfigurationError;

/// A series label such as "2º Ano" together with the grade it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Series {
    pub(crate) label: String,
    pub(crate) grade: u8,
}

impl Series {
    /// Reads the first run of digits, so "2º Ano", "2º" and "2" are all grade 2.
    pub(crate) fn parse(label: &str) -> Result<Self, ConfigurationError> {
        let digits = label
            .trim()
            .chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(char::is_ascii_digit)
            .collect::<String>();

        let grade = digits
            .parse::<u8>()
            .map_err(|_| ConfigurationError::UnreadableSeries(label.to_string()))?;

        Ok(Self { label: label.trim().to_string(), grade })
    }

    pub(crate) fn tier(&self) -> Result<TierRule, ConfigurationError> {
        TierRule::for_grade(self.grade)
    }
}

/// Grades 2, 3 and 5: Portuguese, Maths and the essay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ElementaryTierRule;

/// Grades 6 to 9: Portuguese, Social Studies, Maths and Sciences, no essay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UpperTierRule;

impl ElementaryTierRule {
    const AVERAGED: [SubjectCode; 2] = [SubjectCode::Lp, SubjectCode::Mat];
}

impl UpperTierRule {
    const AVERAGED: [SubjectCode; 4] =
        [SubjectCode::Lp, SubjectCode::Ch, SubjectCode::Mat, SubjectCode::Cn];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TierRule {
    Elementary(ElementaryTierRule),
    Upper(UpperTierRule),
}

impl TierRule {
    pub(crate) fn for_grade(grade: u8) -> Result<Self, ConfigurationError> {
        match grade {
            2 | 3 | 5 => Ok(TierRule::Elementary(ElementaryTierRule)),
            6..=9 => Ok(TierRule::Upper(UpperTierRule)),
            other => Err(ConfigurationError::UnsupportedGrade(other)),
        }
    }

    /// Subjects whose scaled score enters the overall average.
    pub(crate) fn averaged_subjects(self) -> &'static [SubjectCode] {
        match self {
            TierRule::Elementary(_) => &ElementaryTierRule::AVERAGED,
            TierRule::Upper(_) => &UpperTierRule::AVERAGED,
        }
    }

    pub(crate) fn includes_essay(self) -> bool {
        match self {
            TierRule::Elementary(_) => true,
            TierRule::Upper(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_labels_resolve_to_grades() {
        for (label, grade) in [("2º Ano", 2), ("2", 2), ("2º", 2), (" 9º ano ", 9), ("Ano 6", 6)] {
            assert_eq!(Series::parse(label).expect(label).grade, grade, "label {label}");
        }
    }

    #[test]
    fn unreadable_series_is_a_configuration_error() {
        assert_eq!(
            Series::parse("Infantil"),
            Err(ConfigurationError::UnreadableSeries("Infantil".to_string()))
        );
        assert!(Series::parse("").is_err());
    }

    #[test]
    fn grades_map_to_tiers() {
        for grade in [2, 3, 5] {
            assert_eq!(TierRule::for_grade(grade), Ok(TierRule::Elementary(ElementaryTierRule)));
        }
        for grade in 6..=9 {
            assert_eq!(TierRule::for_grade(grade), Ok(TierRule::Upper(UpperTierRule)));
        }
        for grade in [0, 1, 4, 10] {
            let rejected = TierRule::for_grade(grade);
            assert_eq!(rejected, Err(ConfigurationError::UnsupportedGrade(grade)));
        }
    }

    #[test]
    fn tiers_average_their_own_subjects() {
        let elementary = TierRule::for_grade(3).expect("tier");
        assert_eq!(elementary.averaged_subjects(), &[SubjectCode::Lp, SubjectCode::Mat]);
        assert!(elementary.includes_essay());

        let upper = TierRule::for_grade(7).expect("tier");
        assert_eq!(upper.averaged_subjects().len(), 4);
        assert!(!upper.includes_essay());
    }
}
