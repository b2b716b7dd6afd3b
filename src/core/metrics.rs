use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled || PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);

    metrics::describe_counter!("omr_sampled_bubbles_total", "Bubbles sampled by the mark sampler");
    metrics::describe_counter!(
        "omr_out_of_bounds_samples_total",
        "Bubble windows that fell entirely outside the scanned image"
    );
    metrics::describe_counter!(
        "omr_ambiguous_marks_total",
        "Questions where more than one alternative crossed the mark threshold"
    );
    metrics::describe_counter!("answer_keys_missing_total", "Questions excluded for lack of a key");
    metrics::describe_counter!("consolidation_writes_total", "Consolidated results written");
    metrics::describe_counter!(
        "consolidation_write_retries_total",
        "Per-student write attempts retried after a storage failure"
    );
    metrics::describe_counter!(
        "consolidation_write_failures_total",
        "Per-student writes abandoned after exhausting retries"
    );
    metrics::describe_counter!(
        "consolidation_writes_superseded_total",
        "Recomputed results skipped because a newer write landed first"
    );
    metrics::describe_counter!("scan_jobs_total", "Scan jobs finished, labelled by outcome");
    metrics::describe_histogram!("scan_job_duration_seconds", "Wall time of one scan job");
    Ok(())
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}
