use super::{round2, StudentSubjectScore, TierRule};

/// Mean of the tier's subjects that were actually scored, plus the essay for
/// the elementary tier. A subject missing from `scores` was not assessed and
/// does not enter the denominator; a scored zero does.
pub(crate) fn overall_average(
    rule: TierRule,
    scores: &[StudentSubjectScore],
    essay_score: Option<f64>,
) -> Option<f64> {
    let mut terms = rule
        .averaged_subjects()
        .iter()
        .filter_map(|subject| scores.iter().find(|score| score.subject == *subject))
        .map(|score| score.scaled_score)
        .collect::<Vec<_>>();

    if rule.includes_essay() {
        terms.extend(essay_score);
    }

    if terms.is_empty() {
        return None;
    }

    Some(round2(terms.iter().sum::<f64>() / terms.len() as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::SubjectCode;

    fn score(subject: SubjectCode, scaled_score: f64) -> StudentSubjectScore {
        StudentSubjectScore {
            student_id: "s1".to_string(),
            subject,
            correct_count: 0,
            scaled_score,
            proficiency_level: None,
        }
    }

    #[test]
    fn elementary_average_includes_the_essay() {
        let rule = TierRule::for_grade(2).expect("tier");
        let scores = vec![score(SubjectCode::Lp, 5.00), score(SubjectCode::Mat, 2.86)];

        assert_eq!(overall_average(rule, &scores, Some(3.00)), Some(3.62));
    }

    #[test]
    fn elementary_average_without_essay_uses_remaining_terms() {
        let rule = TierRule::for_grade(5).expect("tier");
        let scores = vec![score(SubjectCode::Lp, 6.0), score(SubjectCode::Mat, 8.0)];

        assert_eq!(overall_average(rule, &scores, None), Some(7.0));
    }

    #[test]
    fn upper_average_skips_unassessed_subjects() {
        let rule = TierRule::for_grade(8).expect("tier");
        let scores = vec![
            score(SubjectCode::Lp, 8.0),
            score(SubjectCode::Mat, 6.0),
            score(SubjectCode::Cn, 7.0),
        ];

        assert_eq!(overall_average(rule, &scores, None), Some(round2(21.0 / 3.0)));
    }

    #[test]
    fn upper_average_ignores_essay_scores() {
        let rule = TierRule::for_grade(9).expect("tier");
        let scores = vec![score(SubjectCode::Lp, 4.0), score(SubjectCode::Mat, 6.0)];

        assert_eq!(overall_average(rule, &scores, Some(10.0)), Some(5.0));
    }

    #[test]
    fn administered_zero_still_counts() {
        let rule = TierRule::for_grade(6).expect("tier");
        let scores = vec![
            score(SubjectCode::Lp, 0.0),
            score(SubjectCode::Ch, 5.0),
            score(SubjectCode::Mat, 10.0),
            score(SubjectCode::Cn, 5.0),
        ];

        assert_eq!(overall_average(rule, &scores, None), Some(5.0));
    }

    #[test]
    fn nothing_scored_means_no_average() {
        let rule = TierRule::for_grade(3).expect("tier");
        assert_eq!(overall_average(rule, &[], None), None);
    }
}
