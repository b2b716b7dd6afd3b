use anyhow::Result;
use tokio::sync::watch;
use tokio::time::{interval, sleep, Duration};

use crate::core::state::AppState;
use crate::tasks::scanning;

const STALE_SCAN_CHECK_SECONDS: u64 = 60;

pub(crate) async fn run(state: AppState) -> Result<()> {
    let workers = state.settings().scan_worker().concurrency;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut handles = Vec::with_capacity(workers + 1);
    for worker in 0..workers {
        handles.push(tokio::spawn(scan_worker(state.clone(), worker, shutdown_rx.clone())));
    }
    handles.push(tokio::spawn(requeue_stale_loop(state.clone(), shutdown_rx.clone())));

    tracing::info!(workers, "Scan workers started");

    crate::core::shutdown::shutdown_signal().await;
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("Failed to broadcast shutdown signal to background tasks");
    }

    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "Background task join failed");
        }
    }

    Ok(())
}

async fn scan_worker(state: AppState, worker: usize, mut shutdown: watch::Receiver<bool>) {
    let poll = Duration::from_secs(state.settings().scan_worker().poll_interval_seconds);

    loop {
        if *shutdown.borrow() {
            break;
        }

        match scanning::claim_next_job(&state).await {
            Ok(Some(job)) => {
                if let Err(err) = scanning::process_scan_job(&state, &job).await {
                    tracing::error!(
                        worker,
                        job_id = %job.id,
                        error = %err,
                        "Failed to record scan job outcome"
                    );
                }
                continue;
            }
            Ok(None) => {}
            Err(err) => tracing::error!(worker, error = %err, "Failed to claim scan job"),
        }

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = sleep(poll) => {}
        }
    }
}

async fn requeue_stale_loop(state: AppState, mut shutdown: watch::Receiver<bool>) {
    let mut tick = interval(Duration::from_secs(STALE_SCAN_CHECK_SECONDS));
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tick.tick() => {
                if let Err(err) = scanning::requeue_stale_jobs(&state).await {
                    tracing::error!(error = %err, "requeue_stale_jobs failed");
                }
            }
        }
    }
}
