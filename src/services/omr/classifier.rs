use serde::{Deserialize, Serialize};

use super::Alternative;
use crate::services::scoring::round2;

pub(crate) const DEFAULT_MARK_THRESHOLD: f64 = 0.60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DetectedResponse {
    pub(crate) question_id: String,
    pub(crate) question_number: u32,
    pub(crate) alternative: Option<Alternative>,
    /// Darkness of the chosen bubble as a percentage, 0 when nothing was marked.
    pub(crate) confidence: f64,
    pub(crate) ambiguous: bool,
}

/// Picks the marked alternative of one question.
///
/// Any bubble strictly darker than `threshold` is a candidate. The darkest
/// candidate wins, ties going to the earlier letter. Several candidates still
/// produce an answer but raise `ambiguous` for the audit trail.
pub(crate) fn classify_question(
    question_id: &str,
    question_number: u32,
    ratios: &[(Alternative, f64)],
    threshold: f64,
) -> DetectedResponse {
    let mut best: Option<(Alternative, f64)> = None;
    let mut candidates = 0usize;

    for &(alternative, ratio) in ratios {
        if ratio.is_nan() || ratio <= threshold {
            continue;
        }
        candidates += 1;
        best = match best {
            Some((current, current_ratio))
                if current_ratio > ratio || (current_ratio == ratio && current < alternative) =>
            {
                Some((current, current_ratio))
            }
            _ => Some((alternative, ratio)),
        };
    }

    match best {
        Some((alternative, ratio)) => DetectedResponse {
            question_id: question_id.to_string(),
            question_number,
            alternative: Some(alternative),
            confidence: round2((ratio * 100.0).clamp(0.0, 100.0)),
            ambiguous: candidates > 1,
        },
        None => DetectedResponse {
            question_id: question_id.to_string(),
            question_number,
            alternative: None,
            confidence: 0.0,
            ambiguous: false,
        },
    }
}
