use std::sync::Arc;

use sqlx::PgPool;

use crate::core::config::Settings;
use crate::services::omr::DetectionOptions;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
}

impl AppState {
    pub(crate) fn new(settings: Settings, db: PgPool) -> Self {
        Self { inner: Arc::new(InnerState { settings, db }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn detection_options(&self) -> DetectionOptions {
        let omr = self.settings().omr();
        DetectionOptions {
            mark_threshold: omr.mark_threshold,
            window_half_size: omr.window_half_size,
        }
    }
}
