/// Host configuration
use crate::error::{CliError, Result};
use cadence_playback::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default log filter when neither `RUST_LOG` nor `logging.filter` is set
pub const DEFAULT_LOG_FILTER: &str = "cadence=info,cadence_playback=info";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CadenceConfig {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,

    #[serde(default = "default_database_url")]
    pub database_url: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// `EnvFilter` directives, e.g. `cadence_playback=debug`
    #[serde(default)]
    pub filter: Option<String>,
}

impl CadenceConfig {
    /// Load configuration from `cadence.toml` (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("cadence.toml"))
    }

    /// Load configuration from the given file (if present) and the environment
    ///
    /// Environment variables use the `CADENCE_` prefix and `__` between
    /// sections, e.g. `CADENCE_SESSION__TICK_INTERVAL_MS=500`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut settings = config::Config::builder();

        if path.exists() {
            settings = settings.add_source(config::File::from(PathBuf::from(path)));
        }

        settings = settings.add_source(
            config::Environment::with_prefix("CADENCE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = settings
            .build()
            .map_err(|e| CliError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| CliError::Config(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let session = &self.session;

        if session.tick_interval_ms == 0 || session.sleep_tick_interval_ms == 0 {
            return Err(CliError::Config(
                "tick intervals must be greater than zero".to_string(),
            ));
        }

        if session.checkpoint_interval_ms < session.tick_interval_ms {
            return Err(CliError::Config(format!(
                "checkpoint interval ({}ms) is shorter than the tick interval ({}ms)",
                session.checkpoint_interval_ms, session.tick_interval_ms
            )));
        }

        if session.command_buffer == 0 || session.event_buffer == 0 {
            return Err(CliError::Config(
                "channel buffers must hold at least one message".to_string(),
            ));
        }

        if session.snapshot_key.trim().is_empty() {
            return Err(CliError::Config("snapshot key is required".to_string()));
        }

        if self.storage.backend == StorageBackend::Sqlite
            && !self.storage.database_url.starts_with("sqlite:")
        {
            return Err(CliError::Config(format!(
                "unsupported database url {:?} (expected sqlite:...)",
                self.storage.database_url
            )));
        }

        Ok(())
    }

    /// Log filter directives from config, falling back to the default
    pub fn log_filter(&self) -> &str {
        self.logging.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}

fn default_database_url() -> String {
    "sqlite://./data/cadence.db".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            database_url: default_database_url(),
        }
    }
}
