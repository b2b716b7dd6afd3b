use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

/// Installs the global subscriber. `RUST_LOG` wins over `AVALIA_LOG_LEVEL`;
/// sqlx statement logging stays at warn unless asked for explicitly.
pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let telemetry = settings.telemetry();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("{},sqlx=warn", telemetry.log_level)))
        .with_context(|| format!("invalid AVALIA_LOG_LEVEL '{}'", telemetry.log_level))?;

    let builder = fmt().with_env_filter(filter).with_target(false);
    let installed = if telemetry.json {
        builder.json().flatten_event(true).with_current_span(true).try_init()
    } else {
        builder.compact().try_init()
    };
    installed.map_err(|err| anyhow::anyhow!(err.to_string()))?;

    tracing::debug!(
        environment = settings.runtime().environment.as_str(),
        json = telemetry.json,
        "Tracing initialised"
    );
    Ok(())
}
