use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::core::time::primitive_now_utc;
use crate::repositories;
use crate::services::consolidation::{ConsolidationInputs, StudentConsolidatedResult};
use crate::services::errors::PersistenceError;

const RETRY_BASE_DELAY_MS: u64 = 100;

/// Replaces one student's consolidated result as a single unit.
///
/// Implementations must be all-or-nothing: after an error the previously stored
/// result is still the visible one.
#[async_trait]
pub(crate) trait ResultStore: Send + Sync {
    async fn replace(
        &self,
        result: &StudentConsolidatedResult,
        inputs: &ConsolidationInputs,
    ) -> Result<(), PersistenceError>;

    /// Replaces the result only while the stored inputs still equal `inputs`.
    /// Returns `false` without writing when the row is gone or was rewritten
    /// from other inputs in the meantime.
    async fn replace_if_inputs_unchanged(
        &self,
        result: &StudentConsolidatedResult,
        inputs: &ConsolidationInputs,
    ) -> Result<bool, PersistenceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOutcome {
    Written,
    /// A newer write for the student landed first; nothing was changed.
    Superseded,
}

pub(crate) struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn replace(
        &self,
        result: &StudentConsolidatedResult,
        inputs: &ConsolidationInputs,
    ) -> Result<(), PersistenceError> {
        repositories::consolidated_results::replace(
            &self.pool,
            result,
            inputs,
            primitive_now_utc(),
        )
        .await?;
        Ok(())
    }

    async fn replace_if_inputs_unchanged(
        &self,
        result: &StudentConsolidatedResult,
        inputs: &ConsolidationInputs,
    ) -> Result<bool, PersistenceError> {
        let written = repositories::consolidated_results::replace_if_inputs_unchanged(
            &self.pool,
            result,
            inputs,
            primitive_now_utc(),
        )
        .await?;
        Ok(written)
    }
}

/// Writes a result, retrying the whole student with exponential backoff.
pub(crate) async fn write_with_retry(
    store: &dyn ResultStore,
    result: &StudentConsolidatedResult,
    inputs: &ConsolidationInputs,
    max_retries: u32,
) -> Result<(), PersistenceError> {
    retry_write(result, max_retries, move || async move {
        store.replace(result, inputs).await.map(|()| WriteOutcome::Written)
    })
    .await
    .map(|_| ())
}

/// Rewrites a result recomputed from stored inputs. A student whose inputs
/// changed after they were read is left alone and reported as superseded.
pub(crate) async fn rewrite_with_retry(
    store: &dyn ResultStore,
    result: &StudentConsolidatedResult,
    inputs: &ConsolidationInputs,
    max_retries: u32,
) -> Result<WriteOutcome, PersistenceError> {
    let outcome = retry_write(result, max_retries, move || async move {
        let written = store.replace_if_inputs_unchanged(result, inputs).await?;
        Ok(if written { WriteOutcome::Written } else { WriteOutcome::Superseded })
    })
    .await?;

    if outcome == WriteOutcome::Superseded {
        metrics::counter!("consolidation_writes_superseded_total").increment(1);
        tracing::info!(
            student_id = %result.student_id,
            ano_letivo = result.ano_letivo,
            "Stored inputs changed since they were read; rewrite skipped"
        );
    }
    Ok(outcome)
}

async fn retry_write<F, Fut>(
    result: &StudentConsolidatedResult,
    max_retries: u32,
    mut write: F,
) -> Result<WriteOutcome, PersistenceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<WriteOutcome, PersistenceError>>,
{
    let mut attempt = 0;
    loop {
        match write().await {
            Ok(outcome) => {
                if outcome == WriteOutcome::Written {
                    metrics::counter!("consolidation_writes_total").increment(1);
                }
                return Ok(outcome);
            }
            Err(err) if attempt < max_retries => {
                metrics::counter!("consolidation_write_retries_total").increment(1);
                tracing::warn!(
                    student_id = %result.student_id,
                    ano_letivo = result.ano_letivo,
                    attempt,
                    error = %err,
                    "Consolidated write failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(RETRY_BASE_DELAY_MS << attempt.min(6)))
                    .await;
                attempt += 1;
            }
            Err(err) => {
                metrics::counter!("consolidation_write_failures_total").increment(1);
                tracing::error!(
                    student_id = %result.student_id,
                    ano_letivo = result.ano_letivo,
                    error = %err,
                    "Consolidated write failed after retries"
                );
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    type StoredEntry = (StudentConsolidatedResult, ConsolidationInputs);

    /// In-process store with the same replace-or-keep contract as Postgres.
    /// `fail_next` makes the next N writes fail before touching anything.
    #[derive(Default)]
    pub(crate) struct MemoryResultStore {
        results: Mutex<HashMap<(String, i32), StoredEntry>>,
        fail_next: Mutex<u32>,
        attempts: Mutex<u32>,
    }

    impl MemoryResultStore {
        pub(crate) fn failing(times: u32) -> Self {
            Self { fail_next: Mutex::new(times), ..Self::default() }
        }

        pub(crate) fn fail_next_writes(&self, times: u32) {
            *self.fail_next.lock().expect("fail lock") = times;
        }

        pub(crate) fn get(&self, student_id: &str, ano_letivo: i32) -> Option<StoredEntry> {
            self.results
                .lock()
                .expect("results lock")
                .get(&(student_id.to_string(), ano_letivo))
                .cloned()
        }

        pub(crate) fn attempts(&self) -> u32 {
            *self.attempts.lock().expect("attempts lock")
        }
    }

    #[async_trait]
    impl ResultStore for MemoryResultStore {
        async fn replace(
            &self,
            result: &StudentConsolidatedResult,
            inputs: &ConsolidationInputs,
        ) -> Result<(), PersistenceError> {
            *self.attempts.lock().expect("attempts lock") += 1;

            let mut fail_next = self.fail_next.lock().expect("fail lock");
            if *fail_next > 0 {
                *fail_next -= 1;
                return Err(PersistenceError::Unavailable("injected failure".to_string()));
            }

            let key = (result.student_id.clone(), result.ano_letivo);
            let entry = (result.clone(), inputs.clone());
            self.results.lock().expect("results lock").insert(key, entry);
            Ok(())
        }

        async fn replace_if_inputs_unchanged(
            &self,
            result: &StudentConsolidatedResult,
            inputs: &ConsolidationInputs,
        ) -> Result<bool, PersistenceError> {
            let unchanged = self
                .get(&result.student_id, result.ano_letivo)
                .is_some_and(|(_, stored)| stored == *inputs);
            if !unchanged {
                *self.attempts.lock().expect("attempts lock") += 1;
                return Ok(false);
            }
            self.replace(result, inputs).await?;
            Ok(true)
        }
    }
}
