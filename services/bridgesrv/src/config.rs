//! Configuration
//!
//! Layered with figment, later layers win:
//!
//! 1. built-in defaults
//! 2. YAML file (`config/bridgesrv.yaml` or `--config`)
//! 3. environment, `BRIDGESRV_` prefix, `__` between nested keys
//!    (`BRIDGESRV_SESSION__ACCEPT_TIMEOUT_MS=2000`)
//! 4. command-line overrides

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::gearman::WorkerConfig;
use crate::protocol::checksum::Crc16Checksum;
use crate::transport::SessionConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config/bridgesrv.yaml";
pub const ENV_PREFIX: &str = "BRIDGESRV_";

/// Logging section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Append-only log file, `None` for console only
    pub file: Option<PathBuf>,
    pub json: bool,
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: Some(PathBuf::from("/var/log/directa.log")),
            json: false,
            console: true,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub worker: WorkerConfig,
    pub session: SessionConfig,
    pub checksum: Crc16Checksum,
    pub logging: LoggingConfig,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub servers: Vec<String>,
    pub function: Option<String>,
}

impl BridgeConfig {
    /// Load from the standard layers
    pub fn load(path: Option<&Path>, overrides: &CliOverrides) -> Result<Self> {
        let config: Self = Self::figment(path, ENV_PREFIX, overrides)?.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Layer stack without extraction
    ///
    /// An explicit `path` must exist; the default path is optional.
    pub fn figment(path: Option<&Path>, env_prefix: &str, overrides: &CliOverrides) -> Result<Figment> {
        let file = match path {
            Some(path) if !path.exists() => {
                return Err(BridgeError::config(format!(
                    "configuration file not found: {}",
                    path.display()
                )))
            },
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_PATH),
        };

        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(file))
            .merge(Env::prefixed(env_prefix).split("__"));

        if let Some(level) = &overrides.log_level {
            figment = figment.merge(Serialized::default("logging.level", level));
        }
        if let Some(file) = &overrides.log_file {
            figment = figment.merge(Serialized::default("logging.file", file));
        }
        if !overrides.servers.is_empty() {
            figment = figment.merge(Serialized::default("worker.servers", &overrides.servers));
        }
        if let Some(function) = &overrides.function {
            figment = figment.merge(Serialized::default("worker.function", function));
        }
        Ok(figment)
    }

    pub fn validate(&self) -> Result<()> {
        self.worker.validate()?;
        self.session.validate()?;
        if self.logging.level.trim().is_empty() {
            return Err(BridgeError::config("logging.level cannot be empty"));
        }
        Ok(())
    }

    pub fn log_config(&self, ansi: bool) -> common::LogConfig {
        common::LogConfig {
            service_name: "bridgesrv".to_string(),
            log_file: self.logging.file.clone(),
            level: self.logging.level.clone(),
            enable_json: self.logging.json,
            console: self.logging.console,
            ansi,
        }
    }
}
