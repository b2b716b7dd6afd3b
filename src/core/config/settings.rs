use super::parsing::{
    env_optional, env_or_default, is_supported_image_extension, parse_bool, parse_environment,
    parse_f64, parse_string_list, parse_u16, parse_u32, parse_u64, parse_u8, parse_usize,
};
use super::types::{
    ApiSettings, ConfigError, ConsolidationSettings, DatabaseSettings, OmrSettings,
    RuntimeSettings, ScanWorkerSettings, ServerHost, ServerPort, ServerSettings, Settings,
    StorageSettings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("AVALIA_HOST", "0.0.0.0");
        let port = env_or_default("AVALIA_PORT", "8000");

        let environment =
            parse_environment(env_optional("AVALIA_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("AVALIA_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Avalia API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "avalia");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "avalia_db");
        let database_url = env_optional("DATABASE_URL");

        let max_upload_size_mb =
            parse_u64("MAX_UPLOAD_SIZE_MB", env_or_default("MAX_UPLOAD_SIZE_MB", "10"))?;
        let allowed_image_extensions =
            parse_string_list(env_optional("ALLOWED_IMAGE_EXTENSIONS"), &["jpg", "jpeg", "png"]);

        let mark_threshold =
            parse_f64("OMR_MARK_THRESHOLD", env_or_default("OMR_MARK_THRESHOLD", "0.60"))?;
        let window_half_size =
            parse_u32("OMR_WINDOW_HALF_SIZE", env_or_default("OMR_WINDOW_HALF_SIZE", "5"))?;
        let black_luma_threshold = parse_u8(
            "OMR_BLACK_LUMA_THRESHOLD",
            env_or_default("OMR_BLACK_LUMA_THRESHOLD", "128"),
        )?;

        let consolidation_concurrency = parse_usize(
            "CONSOLIDATION_CONCURRENCY",
            env_or_default("CONSOLIDATION_CONCURRENCY", "4"),
        )?;
        let consolidation_max_retries = parse_u32(
            "CONSOLIDATION_MAX_RETRIES",
            env_or_default("CONSOLIDATION_MAX_RETRIES", "3"),
        )?;

        let scan_worker_concurrency =
            parse_usize("SCAN_WORKER_CONCURRENCY", env_or_default("SCAN_WORKER_CONCURRENCY", "2"))?;
        let scan_poll_interval_seconds = parse_u64(
            "SCAN_POLL_INTERVAL_SECONDS",
            env_or_default("SCAN_POLL_INTERVAL_SECONDS", "2"),
        )?;
        let scan_stale_after_minutes = parse_u64(
            "SCAN_STALE_AFTER_MINUTES",
            env_or_default("SCAN_STALE_AFTER_MINUTES", "15"),
        )?;

        let log_level = env_or_default("AVALIA_LOG_LEVEL", "info");
        let json = env_optional("AVALIA_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            storage: StorageSettings { max_upload_size_mb, allowed_image_extensions },
            omr: OmrSettings { mark_threshold, window_half_size, black_luma_threshold },
            consolidation: ConsolidationSettings {
                concurrency: consolidation_concurrency,
                max_retries: consolidation_max_retries,
            },
            scan_worker: ScanWorkerSettings {
                concurrency: scan_worker_concurrency,
                poll_interval_seconds: scan_poll_interval_seconds,
                stale_after_minutes: scan_stale_after_minutes,
            },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn omr(&self) -> &OmrSettings {
        &self.omr
    }

    pub(crate) fn consolidation(&self) -> &ConsolidationSettings {
        &self.consolidation
    }

    pub(crate) fn scan_worker(&self) -> &ScanWorkerSettings {
        &self.scan_worker
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.allowed_image_extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ALLOWED_IMAGE_EXTENSIONS",
                value: String::from("<empty>"),
            });
        }

        for extension in &self.storage.allowed_image_extensions {
            if !is_supported_image_extension(extension) {
                return Err(ConfigError::InvalidValue {
                    field: "ALLOWED_IMAGE_EXTENSIONS",
                    value: extension.clone(),
                });
            }
        }

        if self.omr.mark_threshold <= 0.0 || self.omr.mark_threshold >= 1.0 {
            return Err(ConfigError::InvalidValue {
                field: "OMR_MARK_THRESHOLD",
                value: self.omr.mark_threshold.to_string(),
            });
        }

        if self.omr.window_half_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "OMR_WINDOW_HALF_SIZE",
                value: "0".to_string(),
            });
        }

        if self.consolidation.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "CONSOLIDATION_CONCURRENCY",
                value: "0".to_string(),
            });
        }

        if self.scan_worker.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SCAN_WORKER_CONCURRENCY",
                value: "0".to_string(),
            });
        }

        if self.scan_worker.poll_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "SCAN_POLL_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::core::config::{ConfigError, Settings};
    use crate::test_support;

    #[test]
    fn defaults_load_in_test_environment() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.omr().mark_threshold, 0.60);
        assert_eq!(settings.omr().window_half_size, 5);
        assert_eq!(settings.omr().black_luma_threshold, 128);
        assert_eq!(settings.consolidation().max_retries, 3);
        assert_eq!(settings.api().api_v1_str, "/api/v1");
    }

    #[test]
    fn rejects_threshold_outside_unit_interval() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::set_var("OMR_MARK_THRESHOLD", "1.5");

        let result = Settings::load();
        std::env::remove_var("OMR_MARK_THRESHOLD");

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "OMR_MARK_THRESHOLD", .. })
        ));
    }

    #[test]
    fn strict_mode_requires_database_password() {
        let _guard = test_support::env_lock();
        test_support::set_test_env();
        std::env::remove_var("DATABASE_URL");
        std::env::set_var("AVALIA_STRICT_CONFIG", "1");

        let result = Settings::load();
        std::env::set_var("AVALIA_STRICT_CONFIG", "0");

        assert!(matches!(result, Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"))));
    }
}
