use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::core::state::AppState;
use crate::repositories;
use crate::services::catalog;
use crate::services::consolidation::{
    consolidate, CatalogSnapshot, ConsolidationInputs, StudentContext,
};
use crate::services::consolidation_writer::{
    rewrite_with_retry, PgResultStore, ResultStore, WriteOutcome,
};
use crate::services::errors::CatalogError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub(crate) struct ReprocessSummary {
    pub(crate) grade: u8,
    pub(crate) ano_letivo: i32,
    pub(crate) students: usize,
    pub(crate) rewritten: usize,
    /// Students rewritten by a scan or import while the batch was running.
    pub(crate) superseded: usize,
    pub(crate) rejected: usize,
    pub(crate) write_failures: usize,
}

enum Outcome {
    Rewritten,
    Superseded,
    Rejected,
    WriteFailed,
}

/// Recomputes every stored result of a grade and year from its saved inputs,
/// using the catalog as it is now. A student whose inputs change while the
/// batch runs keeps the newer result.
pub(crate) async fn reprocess_grade(
    state: &AppState,
    grade: u8,
    ano_letivo: i32,
) -> Result<ReprocessSummary, CatalogError> {
    let snapshot = Arc::new(catalog::load_snapshot(state.db(), grade).await?);
    let rows = repositories::consolidated_results::list_for_grade(
        state.db(),
        i16::from(grade),
        ano_letivo,
    )
    .await?;

    let students = rows
        .into_iter()
        .map(|row| {
            let (result, inputs) = row.into_result(Vec::new());
            let student = StudentContext {
                student_id: result.student_id,
                ano_letivo: result.ano_letivo,
                serie: result.serie,
                presence: result.presence,
            };
            (student, inputs)
        })
        .collect::<Vec<_>>();

    let store: Arc<dyn ResultStore> = Arc::new(PgResultStore::new(state.db().clone()));
    let consolidation = state.settings().consolidation();
    let mut summary = reprocess_students(
        store,
        snapshot,
        students,
        consolidation.concurrency,
        consolidation.max_retries,
    )
    .await;
    summary.ano_letivo = ano_letivo;

    tracing::info!(
        grade,
        ano_letivo,
        students = summary.students,
        rewritten = summary.rewritten,
        superseded = summary.superseded,
        rejected = summary.rejected,
        write_failures = summary.write_failures,
        "Grade reprocessed"
    );
    Ok(summary)
}

/// Bounded parallel map over students. A failing student never stops the rest.
pub(crate) async fn reprocess_students(
    store: Arc<dyn ResultStore>,
    snapshot: Arc<CatalogSnapshot>,
    students: Vec<(StudentContext, ConsolidationInputs)>,
    concurrency: usize,
    max_retries: u32,
) -> ReprocessSummary {
    let mut summary = ReprocessSummary {
        grade: snapshot.grade(),
        students: students.len(),
        ..ReprocessSummary::default()
    };
    if let Some((student, _)) = students.first() {
        summary.ano_letivo = student.ano_letivo;
    }

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (student, inputs) in students {
        let semaphore = Arc::clone(&semaphore);
        let snapshot = Arc::clone(&snapshot);
        let store = Arc::clone(&store);

        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return Outcome::WriteFailed;
            };
            let student_id = student.student_id.clone();

            let computed = tokio::task::spawn_blocking(move || {
                consolidate(&student, &inputs.source, &inputs.essay, &snapshot)
                    .map(|result| (result, inputs))
            })
            .await;

            let (result, inputs) = match computed {
                Ok(Ok(computed)) => computed,
                Ok(Err(err)) => {
                    tracing::warn!(student_id = %student_id, error = %err, "Student rejected");
                    return Outcome::Rejected;
                }
                Err(err) => {
                    tracing::error!(
                        student_id = %student_id,
                        error = %err,
                        "Consolidation task panicked"
                    );
                    return Outcome::Rejected;
                }
            };

            match rewrite_with_retry(store.as_ref(), &result, &inputs, max_retries).await {
                Ok(WriteOutcome::Written) => Outcome::Rewritten,
                Ok(WriteOutcome::Superseded) => Outcome::Superseded,
                Err(_) => Outcome::WriteFailed,
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Outcome::Rewritten) => summary.rewritten += 1,
            Ok(Outcome::Superseded) => summary.superseded += 1,
            Ok(Outcome::Rejected) => summary.rejected += 1,
            Ok(Outcome::WriteFailed) => summary.write_failures += 1,
            Err(err) => {
                tracing::error!(error = %err, "Reprocess task join failed");
                summary.write_failures += 1;
            }
        }
    }

    summary
}
