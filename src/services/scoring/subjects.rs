use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::db::types::{ProficiencyLevel, SubjectCode};
use crate::services::errors::{ConfigurationError, ConsolidationError, KeyNotFoundError};
use crate::services::omr::DetectedResponse;

use super::{round2, AnswerKeyCatalog, LevelTable, Series};

/// Which sheet positions belong to a subject for one grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SubjectDefinition {
    pub(crate) subject: SubjectCode,
    pub(crate) grade: u8,
    pub(crate) first_question: u32,
    pub(crate) question_count: u32,
}

impl SubjectDefinition {
    pub(crate) fn contains(&self, question_number: u32) -> bool {
        question_number >= self.first_question
            && question_number < self.first_question + self.question_count
    }

    pub(crate) fn is_assessed(&self) -> bool {
        self.question_count > 0
    }

    pub(crate) fn validate_set(
        grade: u8,
        definitions: &[SubjectDefinition],
    ) -> Result<(), ConfigurationError> {
        let mut seen = HashSet::new();
        for definition in definitions {
            if !seen.insert(definition.subject) {
                return Err(ConfigurationError::DuplicateSubject {
                    subject: definition.subject,
                    grade,
                });
            }
            if definition.first_question == 0 {
                return Err(ConfigurationError::InvalidQuestionRange {
                    subject: definition.subject,
                    grade,
                });
            }
        }

        let assessed = definitions.iter().filter(|d| d.is_assessed()).collect::<Vec<_>>();
        for (index, first) in assessed.iter().enumerate() {
            for second in &assessed[index + 1..] {
                let first_end = first.first_question + first.question_count;
                let second_end = second.first_question + second.question_count;
                if first.first_question < second_end && second.first_question < first_end {
                    return Err(ConfigurationError::OverlappingSubjects {
                        first: first.subject,
                        second: second.subject,
                        grade,
                    });
                }
            }
        }

        Ok(())
    }
}

/// Correct counts per subject as delivered by a spreadsheet import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct ImportedRawScores {
    pub(crate) correct_counts: BTreeMap<SubjectCode, u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SubjectTally {
    pub(crate) subject: SubjectCode,
    pub(crate) correct_count: u32,
    /// Questions that count towards the scaled score (configured minus unkeyed).
    pub(crate) scored_questions: u32,
    pub(crate) configured_questions: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Tally {
    pub(crate) subjects: Vec<SubjectTally>,
    pub(crate) excluded_questions: Vec<KeyNotFoundError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StudentSubjectScore {
    pub(crate) student_id: String,
    pub(crate) subject: SubjectCode,
    pub(crate) correct_count: u32,
    pub(crate) scaled_score: f64,
    pub(crate) proficiency_level: Option<ProficiencyLevel>,
}

/// Counts correct answers per subject from a scanned sheet.
///
/// Subjects without questions for the grade produce no tally at all. Questions
/// whose key cannot be resolved are left out of both the count and the
/// denominator and returned in `excluded_questions`.
pub(crate) fn tally_detected(
    responses: &[DetectedResponse],
    definitions: &[SubjectDefinition],
    keys: &AnswerKeyCatalog,
    series: &Series,
) -> Tally {
    let mut by_number: BTreeMap<u32, &DetectedResponse> = BTreeMap::new();
    for response in responses {
        by_number.entry(response.question_number).or_insert(response);
    }

    let mut tally = Tally::default();
    for definition in definitions.iter().filter(|d| d.is_assessed()) {
        let mut correct_count = 0;
        let mut excluded = 0;

        for response in by_number.values().filter(|r| definition.contains(r.question_number)) {
            match keys.resolve(&response.question_id, response.question_number, series) {
                Ok(key) if response.alternative == Some(key) => correct_count += 1,
                Ok(_) => {}
                Err(missing) => {
                    excluded += 1;
                    tally.excluded_questions.push(missing);
                }
            }
        }

        let scored_questions = definition.question_count.saturating_sub(excluded);
        if scored_questions == 0 {
            tracing::warn!(
                subject = %definition.subject,
                grade = definition.grade,
                "Every question of the subject lacks an answer key; subject omitted"
            );
            continue;
        }

        tally.subjects.push(SubjectTally {
            subject: definition.subject,
            correct_count,
            scored_questions,
            configured_questions: definition.question_count,
        });
    }

    if !tally.excluded_questions.is_empty() {
        metrics::counter!("answer_keys_missing_total")
            .increment(tally.excluded_questions.len() as u64);
    }

    tally
}

/// Validates an imported row against the grade's subjects.
///
/// A subject missing from the row stays unassessed; a non-zero count for a
/// subject the grade does not assess is rejected as misfiled.
pub(crate) fn tally_imported(
    raw: &ImportedRawScores,
    definitions: &[SubjectDefinition],
    grade: u8,
) -> Result<Vec<SubjectTally>, ConsolidationError> {
    for (&subject, &correct) in &raw.correct_counts {
        let assessed = definitions.iter().any(|d| d.subject == subject && d.is_assessed());
        if !assessed && correct > 0 {
            return Err(ConsolidationError::ImportedUnassessedSubject { subject, grade });
        }
    }

    let mut tallies = Vec::new();
    for definition in definitions.iter().filter(|d| d.is_assessed()) {
        let Some(&correct) = raw.correct_counts.get(&definition.subject) else {
            continue;
        };
        if correct > definition.question_count {
            return Err(ConsolidationError::ImportedCountOutOfRange {
                subject: definition.subject,
                correct,
                question_count: definition.question_count,
            });
        }
        tallies.push(SubjectTally {
            subject: definition.subject,
            correct_count: correct,
            scored_questions: definition.question_count,
            configured_questions: definition.question_count,
        });
    }

    Ok(tallies)
}

/// Turns tallies into 0-10 scores and levels, in subject order.
pub(crate) fn score_subjects(
    student_id: &str,
    tallies: &[SubjectTally],
    grade: u8,
    levels: &LevelTable,
) -> Vec<StudentSubjectScore> {
    let mut scores = tallies
        .iter()
        .filter(|tally| tally.scored_questions > 0)
        .map(|tally| StudentSubjectScore {
            student_id: student_id.to_string(),
            subject: tally.subject,
            correct_count: tally.correct_count,
            scaled_score: round2(
                f64::from(tally.correct_count) / f64::from(tally.scored_questions) * 10.0,
            ),
            proficiency_level: Some(levels.classify(
                grade,
                tally.subject,
                tally.configured_questions,
                tally.level_count(),
            )),
        })
        .collect::<Vec<_>>();
    scores.sort_by_key(|score| score.subject);
    scores
}

impl SubjectTally {
    /// Correct count projected onto the configured question count, rounded half
    /// up, so unkeyed questions never count as wrong answers for the level.
    fn level_count(&self) -> u32 {
        if self.scored_questions == 0 || self.scored_questions >= self.configured_questions {
            return self.correct_count;
        }
        let correct = u64::from(self.correct_count);
        let configured = u64::from(self.configured_questions);
        let scored = u64::from(self.scored_questions);
        let projected = (2 * correct * configured + scored) / (2 * scored);
        u32::try_from(projected)
            .map_or(self.configured_questions, |count| count.min(self.configured_questions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::omr::Alternative;

    fn alt(letter: &str) -> Alternative {
        Alternative::parse(letter).expect("letter")
    }

    fn definition(subject: SubjectCode, first: u32, count: u32) -> SubjectDefinition {
        SubjectDefinition { subject, grade: 7, first_question: first, question_count: count }
    }

    fn response(number: u32, letter: Option<&str>) -> DetectedResponse {
        DetectedResponse {
            question_id: format!("Q{number}"),
            question_number: number,
            alternative: letter.map(alt),
            confidence: if letter.is_some() { 90.0 } else { 0.0 },
            ambiguous: false,
        }
    }

    fn keys_all(letter: &str, numbers: std::ops::RangeInclusive<u32>) -> AnswerKeyCatalog {
        let mut keys = AnswerKeyCatalog::default();
        for number in numbers {
            keys.insert_default(format!("Q{number}"), alt(letter));
        }
        keys
    }

    #[test]
    fn counts_matches_inside_each_range() {
        let definitions =
            vec![definition(SubjectCode::Lp, 1, 4), definition(SubjectCode::Mat, 5, 4)];
        let keys = keys_all("A", 1..=8);
        let responses = vec![
            response(1, Some("A")),
            response(2, Some("A")),
            response(3, Some("B")),
            response(4, None),
            response(5, Some("A")),
            response(6, Some("C")),
            response(7, Some("D")),
            response(8, Some("A")),
        ];
        let series = Series::parse("7º Ano").expect("series");

        let tally = tally_detected(&responses, &definitions, &keys, &series);

        assert!(tally.excluded_questions.is_empty());
        assert_eq!(
            tally.subjects,
            vec![
                SubjectTally {
                    subject: SubjectCode::Lp,
                    correct_count: 2,
                    scored_questions: 4,
                    configured_questions: 4,
                },
                SubjectTally {
                    subject: SubjectCode::Mat,
                    correct_count: 2,
                    scored_questions: 4,
                    configured_questions: 4,
                },
            ]
        );
    }

    #[test]
    fn zero_question_subjects_are_omitted_not_zeroed() {
        let definitions = vec![
            definition(SubjectCode::Lp, 1, 2),
            definition(SubjectCode::Ch, 3, 0),
            definition(SubjectCode::Mat, 3, 2),
        ];
        let keys = keys_all("B", 1..=4);
        let responses = (1..=4).map(|n| response(n, Some("B"))).collect::<Vec<_>>();
        let series = Series::parse("7").expect("series");

        let tally = tally_detected(&responses, &definitions, &keys, &series);
        let scores = score_subjects("s1", &tally.subjects, 7, &LevelTable::default());

        assert!(scores.iter().all(|score| score.subject != SubjectCode::Ch));
        assert_eq!(scores.len(), 2);
    }

    #[test]
    fn unkeyed_questions_are_excluded_and_reported() {
        let definitions = vec![definition(SubjectCode::Lp, 1, 4)];
        let keys = keys_all("C", 1..=3);
        let responses = (1..=4).map(|n| response(n, Some("C"))).collect::<Vec<_>>();
        let series = Series::parse("8º Ano").expect("series");

        let tally = tally_detected(&responses, &definitions, &keys, &series);

        assert_eq!(tally.excluded_questions.len(), 1);
        assert_eq!(tally.excluded_questions[0].question_id, "Q4");
        assert_eq!(tally.subjects[0].correct_count, 3);
        assert_eq!(tally.subjects[0].scored_questions, 3);

        let scores = score_subjects("s1", &tally.subjects, 8, &LevelTable::default());
        assert_eq!(scores[0].scaled_score, 10.0);
    }

    #[test]
    fn unkeyed_questions_do_not_drag_the_level_down() {
        let definitions = vec![definition(SubjectCode::Lp, 1, 14)];
        let keys = keys_all("A", 1..=7);
        let series = Series::parse("7º Ano").expect("series");

        let all_right = (1..=14).map(|n| response(n, Some("A"))).collect::<Vec<_>>();
        let tally = tally_detected(&all_right, &definitions, &keys, &series);
        let scores = score_subjects("s1", &tally.subjects, 7, &LevelTable::default());
        assert_eq!(scores[0].scaled_score, 10.0);
        assert_eq!(scores[0].proficiency_level, Some(ProficiencyLevel::N4));

        // 4 of 7 keyed questions right projects to 8 of 14: above the N2 bound of 7.
        let some_right = (1..=14)
            .map(|n| response(n, Some(if n <= 4 { "A" } else { "B" })))
            .collect::<Vec<_>>();
        let tally = tally_detected(&some_right, &definitions, &keys, &series);
        let scores = score_subjects("s1", &tally.subjects, 7, &LevelTable::default());
        assert_eq!(scores[0].scaled_score, 5.71);
        assert_eq!(scores[0].proficiency_level, Some(ProficiencyLevel::N3));
    }

    #[test]
    fn subject_with_no_keys_at_all_is_omitted() {
        let definitions =
            vec![definition(SubjectCode::Lp, 1, 2), definition(SubjectCode::Cn, 3, 2)];
        let keys = keys_all("A", 1..=2);
        let responses = (1..=4).map(|n| response(n, Some("A"))).collect::<Vec<_>>();
        let series = Series::parse("9").expect("series");

        let tally = tally_detected(&responses, &definitions, &keys, &series);

        assert_eq!(tally.subjects.len(), 1);
        assert_eq!(tally.excluded_questions.len(), 2);
    }

    #[test]
    fn scaled_scores_round_to_two_decimals() {
        let tallies = vec![
            SubjectTally {
                subject: SubjectCode::Mat,
                correct_count: 9,
                scored_questions: 14,
                configured_questions: 14,
            },
            SubjectTally {
                subject: SubjectCode::Lp,
                correct_count: 10,
                scored_questions: 14,
                configured_questions: 14,
            },
        ];

        let scores = score_subjects("s1", &tallies, 2, &LevelTable::default());

        assert_eq!(scores[0].subject, SubjectCode::Lp);
        assert_eq!(scores[0].scaled_score, 7.14);
        assert_eq!(scores[0].proficiency_level, Some(ProficiencyLevel::N3));
        assert_eq!(scores[1].scaled_score, 6.43);
        assert_eq!(scores[1].proficiency_level, Some(ProficiencyLevel::N3));
    }

    #[test]
    fn imported_counts_follow_the_same_omission_rule() {
        let definitions = vec![
            definition(SubjectCode::Lp, 1, 20),
            definition(SubjectCode::Ch, 21, 0),
            definition(SubjectCode::Mat, 21, 20),
        ];
        let raw = ImportedRawScores {
            correct_counts: BTreeMap::from([(SubjectCode::Lp, 16), (SubjectCode::Ch, 0)]),
        };

        let tallies = tally_imported(&raw, &definitions, 7).expect("tallies");

        assert_eq!(tallies.len(), 1);
        assert_eq!(tallies[0].subject, SubjectCode::Lp);
        assert_eq!(tallies[0].correct_count, 16);
    }

    #[test]
    fn imported_counts_are_validated() {
        let definitions =
            vec![definition(SubjectCode::Lp, 1, 14), definition(SubjectCode::Mat, 15, 14)];

        let too_many = ImportedRawScores {
            correct_counts: BTreeMap::from([(SubjectCode::Mat, 15)]),
        };
        assert_eq!(
            tally_imported(&too_many, &definitions, 2),
            Err(ConsolidationError::ImportedCountOutOfRange {
                subject: SubjectCode::Mat,
                correct: 15,
                question_count: 14,
            })
        );

        let misfiled = ImportedRawScores {
            correct_counts: BTreeMap::from([(SubjectCode::Cn, 4)]),
        };
        assert_eq!(
            tally_imported(&misfiled, &definitions, 2),
            Err(ConsolidationError::ImportedUnassessedSubject {
                subject: SubjectCode::Cn,
                grade: 2
            })
        );
    }

    #[test]
    fn definition_sets_are_checked_for_overlap_and_duplicates() {
        let overlapping =
            vec![definition(SubjectCode::Lp, 1, 10), definition(SubjectCode::Mat, 10, 10)];
        assert!(matches!(
            SubjectDefinition::validate_set(7, &overlapping),
            Err(ConfigurationError::OverlappingSubjects { .. })
        ));

        let duplicated = vec![definition(SubjectCode::Lp, 1, 5), definition(SubjectCode::Lp, 6, 5)];
        assert_eq!(
            SubjectDefinition::validate_set(7, &duplicated),
            Err(ConfigurationError::DuplicateSubject { subject: SubjectCode::Lp, grade: 7 })
        );

        let fine = vec![
            definition(SubjectCode::Lp, 1, 10),
            definition(SubjectCode::Ch, 11, 0),
            definition(SubjectCode::Mat, 11, 10),
        ];
        assert_eq!(SubjectDefinition::validate_set(7, &fine), Ok(()));
    }
}
