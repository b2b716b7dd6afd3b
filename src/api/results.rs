use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::repositories;
use crate::schemas::result::{ConsolidatedRecord, ImportResultRequest, ReprocessRequest};
use crate::services::catalog;
use crate::services::consolidation::{consolidate, ConsolidationInputs, ScoreSource};
use crate::services::consolidation_writer::{write_with_retry, PgResultStore};
use crate::services::scoring::{Series, TierRule};
use crate::tasks::reprocess::{reprocess_grade, ReprocessSummary};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/import", post(import_result))
        .route("/reprocess", post(reprocess))
        .route("/:student_id/:ano_letivo", get(get_result))
}

/// Consolidates one imported raw-score row and stores it.
async fn import_result(
    State(state): State<AppState>,
    Json(payload): Json<ImportResultRequest>,
) -> Result<Json<ConsolidatedRecord>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let series = Series::parse(&payload.serie)?;
    series.tier()?;
    let snapshot = catalog::load_snapshot(state.db(), series.grade).await?;

    let inputs = ConsolidationInputs {
        source: ScoreSource::Imported(payload.raw_scores()),
        essay: payload.essay(),
    };
    let result = consolidate(&payload.context(), &inputs.source, &inputs.essay, &snapshot)?;

    let store = PgResultStore::new(state.db().clone());
    write_with_retry(&store, &result, &inputs, state.settings().consolidation().max_retries)
        .await?;

    tracing::info!(
        student_id = %result.student_id,
        ano_letivo = result.ano_letivo,
        grade = result.grade,
        media = ?result.overall_average,
        "Imported result consolidated"
    );

    Ok(Json(ConsolidatedRecord::from(&result)))
}

async fn get_result(
    State(state): State<AppState>,
    Path((student_id, ano_letivo)): Path<(String, i32)>,
) -> Result<Json<ConsolidatedRecord>, ApiError> {
    let (row, scores) =
        repositories::consolidated_results::find(state.db(), &student_id, ano_letivo)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch consolidated result"))?
            .ok_or_else(|| ApiError::NotFound("Consolidated result not found".to_string()))?;

    let (result, _) = row.into_result(scores);
    Ok(Json(ConsolidatedRecord::from(&result)))
}

/// Recomputes every stored student of a grade against the current catalog.
async fn reprocess(
    State(state): State<AppState>,
    Json(payload): Json<ReprocessRequest>,
) -> Result<Json<ReprocessSummary>, ApiError> {
    payload.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;
    TierRule::for_grade(payload.grade)?;

    let summary = reprocess_grade(&state, payload.grade, payload.ano_letivo).await?;
    Ok(Json(summary))
}
