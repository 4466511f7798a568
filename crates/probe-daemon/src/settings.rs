//! Configuration loading for probed.
//!
//! Layered config: defaults -> default config file -> `--config` file ->
//! `PROBED_*` environment variables -> CLI flags (applied by the caller).
//! Nested keys use a double underscore in the environment, e.g.
//! `PROBED_SCHEDULER__TIMEZONE=Europe/Berlin`.

use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use directories::ProjectDirs;
use probe_scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "probed";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB storage directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Timeout for one TCP connect probe
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,

    /// How often the daemon re-evaluates suspension windows
    #[serde(default = "default_recheck_interval_secs")]
    pub recheck_interval_secs: u64,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", APP_NAME)
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_recheck_interval_secs() -> u64 {
    60
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            probe_timeout_secs: default_probe_timeout_secs(),
            recheck_interval_secs: default_recheck_interval_secs(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from defaults, config files and the environment.
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir = ProjectDirs::from("", "", APP_NAME)
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())?
            .set_default("log_level", default_log_level())?
            .set_default("probe_timeout_secs", default_probe_timeout_secs() as i64)?
            .set_default("recheck_interval_secs", default_recheck_interval_secs() as i64)?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("PROBED")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// `db_path` with `~` and environment variables expanded.
    pub fn expanded_db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::full(&self.db_path).map_or_else(
            |_| self.db_path.clone(),
            |expanded| expanded.into_owned(),
        ))
    }
}
