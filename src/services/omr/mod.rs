//! Optical mark recognition for bubble answer sheets.
//!
//! [`resolve_grid`] turns a sheet layout into bubble coordinates, [`sample_mark`]
//! measures how dark one bubble is and [`classify_question`] decides which
//! alternative was marked. [`detect`] runs the three over a whole sheet.

mod classifier;
mod geometry;
mod sampler;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub(crate) use classifier::{classify_question, DetectedResponse, DEFAULT_MARK_THRESHOLD};
pub(crate) use geometry::{resolve_grid, BubbleCoordinate, GridLayout};
pub(crate) use sampler::{sample_mark, BinaryRaster, DEFAULT_WINDOW_HALF_SIZE};

/// A single answer letter printed on the sheet, always upper case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub(crate) struct Alternative(char);

impl Alternative {
    pub(crate) fn parse(value: &str) -> Option<Self> {
        let mut chars = value.trim().chars();
        let letter = chars.next()?;
        if chars.next().is_some() || !letter.is_ascii_alphabetic() {
            return None;
        }
        Some(Self(letter.to_ascii_uppercase()))
    }

    pub(crate) fn letter(self) -> char {
        self.0
    }
}

impl fmt::Display for Alternative {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Alternative {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Alternative::parse(&value).ok_or_else(|| format!("invalid alternative letter '{value}'"))
    }
}

impl From<Alternative> for String {
    fn from(value: Alternative) -> Self {
        value.0.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct DetectionOptions {
    pub(crate) mark_threshold: f64,
    pub(crate) window_half_size: u32,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self { mark_threshold: DEFAULT_MARK_THRESHOLD, window_half_size: DEFAULT_WINDOW_HALF_SIZE }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct DetectionReport {
    pub(crate) responses: Vec<DetectedResponse>,
    pub(crate) sampled_bubbles: usize,
    pub(crate) out_of_bounds_samples: usize,
    pub(crate) ambiguous_questions: usize,
}

/// Reads every bubble of a sheet and classifies each question.
///
/// Responses come back in sheet order. Samples that miss the image entirely are
/// counted in the report instead of failing the sheet.
pub(crate) fn detect(
    raster: &BinaryRaster,
    coordinates: &[BubbleCoordinate],
    options: &DetectionOptions,
) -> DetectionReport {
    let mut questions: BTreeMap<u32, (&str, Vec<(Alternative, f64)>)> = BTreeMap::new();
    let mut out_of_bounds_samples = 0;

    for coordinate in coordinates {
        let mark = sample_mark(raster, coordinate, options.window_half_size);
        if mark.out_of_bounds {
            out_of_bounds_samples += 1;
        }
        questions
            .entry(coordinate.question_number)
            .or_insert_with(|| (coordinate.question_id.as_str(), Vec::new()))
            .1
            .push((mark.alternative, mark.darkness_ratio));
    }

    let responses = questions
        .into_iter()
        .map(|(number, (question_id, ratios))| {
            classify_question(question_id, number, &ratios, options.mark_threshold)
        })
        .collect::<Vec<_>>();
    let ambiguous_questions = responses.iter().filter(|response| response.ambiguous).count();

    metrics::counter!("omr_sampled_bubbles_total").increment(coordinates.len() as u64);
    metrics::counter!("omr_out_of_bounds_samples_total").increment(out_of_bounds_samples as u64);
    metrics::counter!("omr_ambiguous_marks_total").increment(ambiguous_questions as u64);

    if out_of_bounds_samples > 0 {
        tracing::warn!(
            out_of_bounds_samples,
            sampled = coordinates.len(),
            "Bubble windows fell outside the scanned image"
        );
    }

    DetectionReport {
        responses,
        sampled_bubbles: coordinates.len(),
        out_of_bounds_samples,
        ambiguous_questions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{letters, paint_sheet, question_ids, sample_layout};

    #[test]
    fn alternative_parse_normalises_case() {
        assert_eq!(Alternative::parse(" c ").map(Alternative::letter), Some('C'));
        assert!(Alternative::parse("").is_none());
        assert!(Alternative::parse("AB").is_none());
        assert!(Alternative::parse("3").is_none());
    }

    #[test]
    fn detect_reads_painted_sheet_in_order() {
        let layout = sample_layout();
        let ids = question_ids(6);
        let marks = [(0, 'A'), (1, 'C'), (3, 'D'), (5, 'B')];
        let raster = paint_sheet(&layout, &ids, &marks);
        let coordinates = resolve_grid(&ids, &layout).expect("grid");

        let report = detect(&raster, &coordinates, &DetectionOptions::default());

        let detected = report
            .responses
            .iter()
            .map(|response| response.alternative.map(Alternative::letter))
            .collect::<Vec<_>>();
        assert_eq!(detected, vec![Some('A'), Some('C'), None, Some('D'), None, Some('B')]);
        assert_eq!(report.sampled_bubbles, ids.len() * letters("ABCD").len());
        assert_eq!(report.out_of_bounds_samples, 0);
        assert_eq!(report.ambiguous_questions, 0);
        assert!(report.responses[0].confidence > 60.0);
        assert_eq!(report.responses[2].confidence, 0.0);
    }

    #[test]
    fn detect_flags_double_marks_without_rejecting_the_sheet() {
        let layout = sample_layout();
        let ids = question_ids(2);
        let raster = paint_sheet(&layout, &ids, &[(0, 'B'), (0, 'C'), (1, 'A')]);
        let coordinates = resolve_grid(&ids, &layout).expect("grid");

        let report = detect(&raster, &coordinates, &DetectionOptions::default());

        assert_eq!(report.ambiguous_questions, 1);
        assert!(report.responses[0].ambiguous);
        assert_eq!(report.responses[0].alternative.map(Alternative::letter), Some('B'));
        assert_eq!(report.responses[1].alternative.map(Alternative::letter), Some('A'));
    }

    #[test]
    fn detect_counts_samples_outside_a_cropped_scan() {
        let layout = sample_layout();
        let ids = question_ids(4);
        let full = paint_sheet(&layout, &ids, &[(0, 'A')]);
        let cropped =
            BinaryRaster::new(image::imageops::crop_imm(full.pixels(), 0, 0, 40, 40).to_image());
        let coordinates = resolve_grid(&ids, &layout).expect("grid");

        let report = detect(&cropped, &coordinates, &DetectionOptions::default());

        assert_eq!(report.responses.len(), 4);
        assert!(report.out_of_bounds_samples > 0);
        assert!(report.responses[3].alternative.is_none());
    }
}
