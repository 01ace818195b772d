use std::path::{Path, PathBuf};
use std::time::Duration;

use schemabound::InlineLimits;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::exception::ConfigError;
use crate::share::get_share_dir;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InliningConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: i64,
    #[serde(default = "default_max_inlinings")]
    pub max_inlinings: i64,
}

impl Default for InliningConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_inlinings: default_max_inlinings(),
        }
    }
}

impl InliningConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_depth < 1 {
            return Err(ConfigError::new("inlining.max_depth must be >= 1"));
        }
        if self.max_inlinings < 1 {
            return Err(ConfigError::new("inlining.max_inlinings must be >= 1"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: i64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RetrievalConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms < 1 {
            return Err(ConfigError::new("retrieval.timeout_ms must be >= 1"));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1) as u64)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub is_from_default_location: bool,
    #[serde(default = "default_workers")]
    pub workers: i64,
    #[serde(default)]
    pub inlining: InliningConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers < 1 {
            return Err(ConfigError::new("workers must be >= 1"));
        }
        self.inlining.validate()?;
        self.retrieval.validate()?;
        Ok(())
    }

    pub fn inline_limits(&self) -> InlineLimits {
        InlineLimits {
            max_depth: self.inlining.max_depth.max(1) as usize,
            max_inlinings: self.inlining.max_inlinings.max(1) as usize,
        }
    }
}

pub fn get_config_file() -> PathBuf {
    get_share_dir().join("config.toml")
}

pub fn get_default_config() -> Config {
    Config {
        is_from_default_location: false,
        workers: default_workers(),
        inlining: InliningConfig::default(),
        retrieval: RetrievalConfig::default(),
    }
}

/// Load `config_file`, or the default config file when it exists.
pub async fn load_config(config_file: Option<&Path>) -> Result<Config, ConfigError> {
    let default_config_file = get_config_file();
    let is_default_config_file = config_file.is_none();
    let config_file = config_file.unwrap_or(default_config_file.as_path());
    debug!("Loading config from file: {}", config_file.display());

    if !path_exists(config_file).await {
        if is_default_config_file {
            debug!("No config file found, using defaults");
            return Ok(get_default_config());
        }
        return Err(ConfigError::new(format!(
            "Config file does not exist: {}",
            config_file.display()
        )));
    }

    let config_text = tokio::fs::read_to_string(config_file)
        .await
        .map_err(|err| ConfigError::new(format!("Failed to read config file: {err}")))?;

    let mut config: Config = if config_file
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
    {
        serde_json::from_str::<Config>(&config_text)
            .map_err(|err| ConfigError::new(format!("Invalid JSON in configuration file: {err}")))?
    } else {
        toml::from_str::<Config>(&config_text)
            .map_err(|err| ConfigError::new(format!("Invalid TOML in configuration file: {err}")))?
    };

    config.is_from_default_location = is_default_config_file;
    config
        .validate()
        .map_err(|err| ConfigError::new(format!("Invalid configuration file: {err}")))?;
    Ok(config)
}

pub fn load_config_from_string(config_string: &str) -> Result<Config, ConfigError> {
    if config_string.trim().is_empty() {
        return Err(ConfigError::new("Configuration text cannot be empty"));
    }

    let json_error = match serde_json::from_str::<serde_json::Value>(config_string) {
        Ok(value) => {
            let config: Config = serde_json::from_value(value)
                .map_err(|err| ConfigError::new(format!("Invalid configuration text: {err}")))?;
            config
                .validate()
                .map_err(|err| ConfigError::new(format!("Invalid configuration text: {err}")))?;
            return Ok(config);
        }
        Err(err) => err.to_string(),
    };

    match toml::from_str::<Config>(config_string) {
        Ok(config) => {
            config
                .validate()
                .map_err(|err| ConfigError::new(format!("Invalid configuration text: {err}")))?;
            Ok(config)
        }
        Err(toml_error) => Err(ConfigError::new(format!(
            "Invalid configuration text: {json_error}; {toml_error}"
        ))),
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok()
}

fn default_workers() -> i64 {
    4
}

fn default_max_depth() -> i64 {
    schemabound::config::DEFAULT_MAX_DEPTH as i64
}

fn default_max_inlinings() -> i64 {
    schemabound::config::DEFAULT_MAX_INLININGS as i64
}

fn default_timeout_ms() -> i64 {
    10_000
}
