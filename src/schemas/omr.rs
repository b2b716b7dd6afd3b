use serde::Deserialize;
use validator::Validate;

use crate::services::omr::GridLayout;

/// Detection of a single sheet without persisting anything.
#[derive(Debug, Deserialize, Validate)]
pub(crate) struct DetectRequest {
    #[validate(length(min = 1, message = "image_base64 must not be empty"))]
    pub(crate) image_base64: String,
    pub(crate) layout: GridLayout,
    #[serde(alias = "questionIds")]
    #[validate(length(min = 1, message = "question_ids must not be empty"))]
    pub(crate) question_ids: Vec<String>,
    #[serde(default)]
    #[validate(range(
        exclusive_min = 0.0,
        exclusive_max = 1.0,
        message = "mark_threshold must be between 0 and 1"
    ))]
    pub(crate) mark_threshold: Option<f64>,
}
