use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::validation::{parse_presence, validate_image_upload};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::schemas::scan::ScanJobResponse;
use crate::services::scoring::Series;

const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub(crate) fn router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(enqueue_scan)
                .layer(DefaultBodyLimit::max(max_upload_bytes + MULTIPART_OVERHEAD_BYTES)),
        )
        .route("/:job_id", get(get_scan))
}

#[derive(Default)]
struct ScanForm {
    student_id: Option<String>,
    ano_letivo: Option<i32>,
    serie: Option<String>,
    presence: Option<String>,
    essay_label: Option<String>,
    essay_score: Option<f64>,
    filename: Option<String>,
    content_type: Option<String>,
    file: Option<Vec<u8>>,
}

async fn read_form(multipart: &mut Multipart, max_bytes: u64) -> Result<ScanForm, ApiError> {
    let mut form = ScanForm::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            form.filename = field.file_name().map(|s| s.to_string());
            form.content_type = field.content_type().map(|s| s.to_string());
            let mut bytes = Vec::new();
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
            {
                if bytes.len() as u64 + chunk.len() as u64 > max_bytes {
                    return Err(ApiError::PayloadTooLarge(format!(
                        "File size exceeds {}MB limit",
                        max_bytes / (1024 * 1024)
                    )));
                }
                bytes.extend_from_slice(&chunk);
            }
            form.file = Some(bytes);
            continue;
        }

        let text = field
            .text()
            .await
            .map_err(|_| ApiError::BadRequest(format!("Invalid value for {name}")))?;
        let text = text.trim().to_string();
        match name.as_str() {
            "student_id" => form.student_id = Some(text),
            "ano_letivo" => {
                form.ano_letivo = Some(text.parse::<i32>().map_err(|_| {
                    ApiError::BadRequest("ano_letivo must be a valid integer".to_string())
                })?);
            }
            "serie" => form.serie = Some(text),
            "presence" => form.presence = Some(text),
            "essay_label" if !text.is_empty() => form.essay_label = Some(text),
            "essay_score" if !text.is_empty() => {
                form.essay_score = Some(text.replace(',', ".").parse::<f64>().map_err(|_| {
                    ApiError::BadRequest("essay_score must be a number".to_string())
                })?);
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Accepts a scanned sheet and queues it for the scan workers.
async fn enqueue_scan(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ScanJobResponse>), ApiError> {
    let max_bytes = state.settings().storage().max_upload_size_mb * 1024 * 1024;
    let form = read_form(&mut multipart, max_bytes).await?;

    let required = |value: Option<String>, field: &str| {
        value
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ApiError::BadRequest(format!("{field} is required")))
    };
    let student_id = required(form.student_id, "student_id")?;
    let serie = required(form.serie, "serie")?;
    let ano_letivo =
        form.ano_letivo.ok_or_else(|| ApiError::BadRequest("ano_letivo is required".to_string()))?;
    let presence = parse_presence(form.presence.as_deref().unwrap_or("present"))?;
    let file = form.file.ok_or_else(|| ApiError::BadRequest("File is required".to_string()))?;

    // Reject unreadable series and unsupported grades before queueing.
    Series::parse(&serie)?.tier()?;

    if let Some(score) = form.essay_score {
        if !(0.0..=10.0).contains(&score) {
            return Err(ApiError::BadRequest("essay_score must be between 0 and 10".to_string()));
        }
    }

    let filename = form.filename.unwrap_or_else(|| "sheet.png".to_string());
    let content_type = form.content_type.unwrap_or_else(|| "application/octet-stream".to_string());
    validate_image_upload(
        &filename,
        &content_type,
        &state.settings().storage().allowed_image_extensions,
    )?;

    let image_sha256 = hex::encode(Sha256::digest(&file));
    let job_id = Uuid::new_v4().to_string();

    let job = repositories::scan_jobs::create(
        state.db(),
        repositories::scan_jobs::CreateScanJob {
            id: &job_id,
            student_id: &student_id,
            ano_letivo,
            serie: &serie,
            presence,
            essay_label: form.essay_label.as_deref(),
            essay_score: form.essay_score,
            image: &file,
            image_sha256: &image_sha256,
            created_at: primitive_now_utc(),
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to queue scan job"))?;

    tracing::info!(
        job_id = %job.id,
        student_id = %job.student_id,
        ano_letivo = job.ano_letivo,
        bytes = file.len(),
        "Scan job queued"
    );

    Ok((StatusCode::ACCEPTED, Json(ScanJobResponse::from_job(job, 0))))
}

async fn get_scan(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ScanJobResponse>, ApiError> {
    let job = repositories::scan_jobs::find_by_id(state.db(), &job_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch scan job"))?
        .ok_or_else(|| ApiError::NotFound("Scan job not found".to_string()))?;

    let ambiguous = repositories::detected_responses::count_ambiguous_for_job(state.db(), &job.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count ambiguous responses"))?;

    Ok(Json(ScanJobResponse::from_job(job, ambiguous)))
}
