pub(crate) mod models;
pub(crate) mod types;

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};

use crate::core::config::Settings;

/// Connections kept for HTTP handlers on top of the background workers.
const HANDLER_CONNECTIONS: u32 = 8;

pub(crate) async fn init_pool(settings: &Settings) -> Result<PgPool, sqlx::Error> {
    let connect_options: PgConnectOptions = settings.database().database_url().parse()?;
    let connect_options = connect_options
        .application_name("avalia-rust")
        .log_statements(tracing::log::LevelFilter::Off);

    // Each scan worker and each reprocessing slot may hold a connection at once.
    let workers = settings.scan_worker().concurrency + settings.consolidation().concurrency;
    let max_connections =
        u32::try_from(workers).unwrap_or(u32::MAX).saturating_add(HANDLER_CONNECTIONS);

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .test_before_acquire(true)
        .connect_with(connect_options)
        .await?;

    tracing::info!(max_connections, "Postgres pool ready");
    Ok(pool)
}

pub(crate) async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Migrations applied");
    Ok(())
}
