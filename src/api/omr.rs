use axum::{extract::State, routing::post, Json, Router};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::validation::decode_image_base64;
use crate::core::state::AppState;
use crate::schemas::omr::DetectRequest;
use crate::services::omr::{detect, resolve_grid, BinaryRaster, DetectionReport};

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/detect", post(detect_sheet))
}

/// Reads one sheet against a caller-supplied layout. Nothing is stored.
async fn detect_sheet(
    State(state): State<AppState>,
    Json(payload): Json<DetectRequest>,
) -> Result<Json<DetectionReport>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let max_bytes = state.settings().storage().max_upload_size_mb * 1024 * 1024;
    let bytes = decode_image_base64(&payload.image_base64, max_bytes)?;
    let coordinates = resolve_grid(&payload.question_ids, &payload.layout)?;

    let mut options = state.detection_options();
    if let Some(threshold) = payload.mark_threshold {
        options.mark_threshold = threshold;
    }
    let black_below = state.settings().omr().black_luma_threshold;

    let report = tokio::task::spawn_blocking(move || {
        BinaryRaster::decode(&bytes, black_below)
            .map(|raster| detect(&raster, &coordinates, &options))
    })
    .await
    .map_err(|e| ApiError::internal(e, "Detection task failed"))?
    .map_err(|e| ApiError::BadRequest(format!("Unreadable image: {e}")))?;

    tracing::info!(
        questions = report.responses.len(),
        ambiguous = report.ambiguous_questions,
        out_of_bounds = report.out_of_bounds_samples,
        "Sheet detected"
    );

    Ok(Json(report))
}
