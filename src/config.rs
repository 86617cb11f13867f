//! Layered settings: CLI flags > `SORRYDB_*` environment > TOML file > defaults

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const ENV_PREFIX: &str = "SORRYDB_";
/// Environment variable naming the config file when `--config` is absent
pub const CONFIG_ENV: &str = "SORRYDB_CONFIG";

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_WORKERS: usize = 2;
const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 3600;
const DEFAULT_EXTRACT_TIMEOUT_SECS: u64 = 600;
const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 120;

/// One source of settings. Unset fields defer to lower layers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsLayer {
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
    pub workers: Option<usize>,
    pub build_timeout_secs: Option<u64>,
    pub extract_timeout_secs: Option<u64>,
    pub network_timeout_secs: Option<u64>,
    pub checkpoint_every: Option<usize>,
    pub lean_data: Option<PathBuf>,
    pub repl_binary: Option<PathBuf>,
}

fn env_key(field: &str) -> String {
    format!("{}{}", ENV_PREFIX, field.to_ascii_uppercase())
}

fn env_string<F: Fn(&str) -> Option<String>>(lookup: &F, field: &str) -> Option<String> {
    lookup(&env_key(field)).filter(|v| !v.trim().is_empty())
}

fn env_parsed<T, F>(lookup: &F, field: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match env_string(lookup, field) {
        None => Ok(None),
        Some(value) => value.trim().parse().map(Some).map_err(|_| ConfigError::Invalid {
            key: env_key(field),
            value,
        }),
    }
}

impl SettingsLayer {
    pub fn from_toml_str(path: &Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(path, &text)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Read `SORRYDB_<FIELD>` variables through `lookup`
    pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            log_level: env_string(&lookup, "log_level"),
            log_file: env_string(&lookup, "log_file").map(PathBuf::from),
            workers: env_parsed(&lookup, "workers")?,
            build_timeout_secs: env_parsed(&lookup, "build_timeout_secs")?,
            extract_timeout_secs: env_parsed(&lookup, "extract_timeout_secs")?,
            network_timeout_secs: env_parsed(&lookup, "network_timeout_secs")?,
            checkpoint_every: env_parsed(&lookup, "checkpoint_every")?,
            lean_data: env_string(&lookup, "lean_data").map(PathBuf::from),
            repl_binary: env_string(&lookup, "repl_binary").map(PathBuf::from),
        })
    }

    /// `higher` wins wherever it sets a value
    pub fn overlay(self, higher: SettingsLayer) -> SettingsLayer {
        SettingsLayer {
            log_level: higher.log_level.or(self.log_level),
            log_file: higher.log_file.or(self.log_file),
            workers: higher.workers.or(self.workers),
            build_timeout_secs: higher.build_timeout_secs.or(self.build_timeout_secs),
            extract_timeout_secs: higher.extract_timeout_secs.or(self.extract_timeout_secs),
            network_timeout_secs: higher.network_timeout_secs.or(self.network_timeout_secs),
            checkpoint_every: higher.checkpoint_every.or(self.checkpoint_every),
            lean_data: higher.lean_data.or(self.lean_data),
            repl_binary: higher.repl_binary.or(self.repl_binary),
        }
    }

    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let log_level = normalize_level(self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL))?;
        let workers = self.workers.unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            return Err(ConfigError::Invalid {
                key: "workers".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(Settings {
            log_level,
            log_file: self.log_file,
            workers,
            build_timeout: Duration::from_secs(self.build_timeout_secs.unwrap_or(DEFAULT_BUILD_TIMEOUT_SECS)),
            extract_timeout: Duration::from_secs(self.extract_timeout_secs.unwrap_or(DEFAULT_EXTRACT_TIMEOUT_SECS)),
            network_timeout: Duration::from_secs(self.network_timeout_secs.unwrap_or(DEFAULT_NETWORK_TIMEOUT_SECS)),
            checkpoint_every: self.checkpoint_every.filter(|&n| n > 0),
            lean_data: self.lean_data,
            repl_binary: self.repl_binary,
        })
    }
}

/// Map common level spellings onto tracing's
fn normalize_level(level: &str) -> Result<String, ConfigError> {
    let lowered = level.trim().to_ascii_lowercase();
    let normalized = match lowered.as_str() {
        "critical" | "fatal" => "error",
        "warning" => "warn",
        "error" | "warn" | "info" | "debug" | "trace" | "off" => lowered.as_str(),
        _ => {
            return Err(ConfigError::Invalid {
                key: "log_level".to_string(),
                value: level.to_string(),
            });
        }
    };
    Ok(normalized.to_string())
}

/// Effective settings for a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub workers: usize,
    pub build_timeout: Duration,
    pub extract_timeout: Duration,
    pub network_timeout: Duration,
    pub checkpoint_every: Option<usize>,
    /// Scratch root for checkouts and the REPL cache
    pub lean_data: Option<PathBuf>,
    pub repl_binary: Option<PathBuf>,
}

impl Settings {
    /// Combine file, environment and CLI layers.
    ///
    /// The file comes from `config_path`, else `SORRYDB_CONFIG`, else none.
    pub fn load(config_path: Option<&Path>, cli: SettingsLayer) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let file = match config_path.map(Path::to_path_buf).or(env_path) {
            Some(path) => SettingsLayer::from_toml_file(&path)?,
            None => SettingsLayer::default(),
        };
        file.overlay(SettingsLayer::from_env()?).overlay(cli).resolve()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_file: None,
            workers: DEFAULT_WORKERS,
            build_timeout: Duration::from_secs(DEFAULT_BUILD_TIMEOUT_SECS),
            extract_timeout: Duration::from_secs(DEFAULT_EXTRACT_TIMEOUT_SECS),
            network_timeout: Duration::from_secs(DEFAULT_NETWORK_TIMEOUT_SECS),
            checkpoint_every: None,
            lean_data: None,
            repl_binary: None,
        }
    }
}
