use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};

use crate::core::state::AppState;
use crate::core::time::{minutes_ago, primitive_now_utc};
use crate::db::models::ScanJob;
use crate::repositories;
use crate::services::catalog::{self, SheetLayout};
use crate::services::consolidation::{
    consolidate, ConsolidationInputs, EssayInput, ScoreSource, StudentContext,
};
use crate::services::consolidation_writer::{write_with_retry, PgResultStore};
use crate::services::omr::{detect, resolve_grid, BinaryRaster, DetectionOptions, DetectionReport};
use crate::services::scoring::Series;

/// Maximum times a job is claimed before a vanished worker fails it for good.
pub(crate) const MAX_SCAN_ATTEMPTS: i32 = 3;

pub(crate) async fn claim_next_job(state: &AppState) -> Result<Option<ScanJob>> {
    repositories::scan_jobs::claim_next(state.db(), primitive_now_utc())
        .await
        .context("Failed to claim scan job")
}

/// Runs one claimed job to completion and records the outcome on the job row.
///
/// Only bookkeeping failures are returned; a sheet that cannot be read or
/// scored fails the job instead.
pub(crate) async fn process_scan_job(state: &AppState, job: &ScanJob) -> Result<()> {
    let started = Instant::now();

    match run_pipeline(state, job).await {
        Ok(report) => {
            let owned = repositories::scan_jobs::mark_completed(
                state.db(),
                &job.id,
                job.attempts,
                primitive_now_utc(),
            )
            .await
            .context("Failed to mark scan job completed")?;
            if owned {
                metrics::counter!("scan_jobs_total", "outcome" => "completed").increment(1);
                tracing::info!(
                    job_id = %job.id,
                    student_id = %job.student_id,
                    ambiguous = report.ambiguous_questions,
                    out_of_bounds = report.out_of_bounds_samples,
                    "Scan job completed"
                );
            } else {
                warn_reclaimed(job);
            }
        }
        Err(err) => {
            let message = format!("{err:#}");
            let owned = repositories::scan_jobs::mark_failed(
                state.db(),
                &job.id,
                job.attempts,
                &message,
                primitive_now_utc(),
            )
            .await
            .context("Failed to mark scan job failed")?;
            if owned {
                metrics::counter!("scan_jobs_total", "outcome" => "failed").increment(1);
                tracing::warn!(
                    job_id = %job.id,
                    student_id = %job.student_id,
                    attempts = job.attempts,
                    error = %message,
                    "Scan job failed"
                );
            } else {
                warn_reclaimed(job);
            }
        }
    }

    metrics::histogram!("scan_job_duration_seconds").record(started.elapsed().as_secs_f64());
    Ok(())
}

fn warn_reclaimed(job: &ScanJob) {
    metrics::counter!("scan_jobs_total", "outcome" => "reclaimed").increment(1);
    tracing::warn!(
        job_id = %job.id,
        attempts = job.attempts,
        "Scan job was requeued while running; outcome discarded"
    );
}

async fn run_pipeline(state: &AppState, job: &ScanJob) -> Result<DetectionReport> {
    let series = Series::parse(&job.serie)?;
    let snapshot = catalog::load_snapshot(state.db(), series.grade).await?;
    let sheet = catalog::load_sheet_layout(state.db(), series.grade).await?;
    let needed = snapshot.sheet_question_count() as usize;
    if sheet.question_ids.len() < needed {
        bail!(
            "sheet layout of grade {} has {} questions but its subjects need {needed}",
            series.grade,
            sheet.question_ids.len()
        );
    }

    let image = repositories::scan_jobs::load_image(state.db(), &job.id)
        .await
        .context("Failed to load scan image")?
        .context("Scan image is missing")?;

    let options = state.detection_options();
    let black_below = state.settings().omr().black_luma_threshold;
    let report =
        tokio::task::spawn_blocking(move || read_sheet(&image, &sheet, &options, black_below))
            .await
            .context("Detection task panicked")??;

    repositories::detected_responses::replace_for_job(state.db(), &job.id, &report.responses)
        .await
        .context("Failed to store detected responses")?;

    let student = StudentContext {
        student_id: job.student_id.clone(),
        ano_letivo: job.ano_letivo,
        serie: job.serie.clone(),
        presence: job.presence,
    };
    let inputs = ConsolidationInputs {
        source: ScoreSource::Detected { responses: report.responses.clone() },
        essay: EssayInput { label: job.essay_label.clone(), score: job.essay_score },
    };
    let result = consolidate(&student, &inputs.source, &inputs.essay, &snapshot)?;

    let store = PgResultStore::new(state.db().clone());
    write_with_retry(&store, &result, &inputs, state.settings().consolidation().max_retries)
        .await?;

    Ok(report)
}

/// Decodes an uploaded sheet and reads every bubble of the grade's layout.
pub(crate) fn read_sheet(
    bytes: &[u8],
    sheet: &SheetLayout,
    options: &DetectionOptions,
    black_below: u8,
) -> Result<DetectionReport> {
    let coordinates = resolve_grid(&sheet.question_ids, &sheet.layout)?;
    let raster = BinaryRaster::decode(bytes, black_below)
        .map_err(|err| anyhow!("Unreadable image: {err}"))?;
    Ok(detect(&raster, &coordinates, options))
}

/// Returns jobs whose worker stopped mid-flight to the queue.
pub(crate) async fn requeue_stale_jobs(state: &AppState) -> Result<()> {
    let now = primitive_now_utc();
    let started_before = minutes_ago(now, state.settings().scan_worker().stale_after_minutes);

    let (requeued, failed) = repositories::scan_jobs::requeue_stale(
        state.db(),
        started_before,
        MAX_SCAN_ATTEMPTS,
        now,
    )
    .await
    .context("Failed to requeue stale scan jobs")?;

    if requeued > 0 || failed > 0 {
        tracing::warn!(requeued, failed, "Recovered stale scan jobs");
    }
    Ok(())
}
