//! # CLI Configuration
//!
//! Loads `AppConfig` from a YAML file (`anyform.yml` in the working directory,
//! or the path given with `--config`) and layers `ANYFORM_` environment
//! variables on top, e.g. `ANYFORM_ENGINE__CACHE_TTL_SECS=60`.

use anyform::EngineConfig;
use anyform_sheets::SheetsConfig;
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "anyform.yml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    General(String),
    #[error("{0}")]
    NotFound(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::General(err.to_string())
    }
}

/// The root configuration structure, mapping directly to `anyform.yml`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    /// Google Sheets backing table. Takes precedence over `table_csv`.
    #[serde(default)]
    pub sheets: Option<SheetsConfig>,
    /// A CSV file used as a read-only backing table.
    #[serde(default)]
    pub table_csv: Option<String>,
}

// Reads a file and substitutes `${VAR}` references from the environment.
// Returns Ok(None) if the file does not exist.
fn read_and_substitute(path: &str) -> Result<Option<String>, ConfigError> {
    if !Path::new(path).exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::General(format!("Failed to read config file '{path}': {e}")))?;

    let re = Regex::new(r"\$\{(?P<var>[A-Z0-9_]+)\}")
        .map_err(|e| ConfigError::General(e.to_string()))?;
    let expanded = re.replace_all(&content, |caps: &regex::Captures| {
        env::var(&caps["var"]).unwrap_or_default()
    });

    Ok(Some(expanded.to_string()))
}

/// Loads the configuration.
///
/// An explicit path must exist; the default `anyform.yml` is optional so that a
/// purely environment-driven setup works too.
pub fn get_config(path_override: Option<&str>) -> Result<AppConfig, ConfigError> {
    let mut builder = ConfigBuilder::builder();

    let path = path_override.unwrap_or(DEFAULT_CONFIG_PATH);
    match read_and_substitute(path)? {
        Some(content) => {
            info!("Loading configuration from '{path}'.");
            builder = builder.add_source(File::from_str(&content, FileFormat::Yaml));
        }
        None if path_override.is_some() => {
            return Err(ConfigError::NotFound(format!(
                "Config file not found at '{path}'."
            )));
        }
        None => info!("'{path}' not found; using defaults and environment only."),
    }

    let settings = builder
        .add_source(
            Environment::with_prefix("ANYFORM")
                .prefix_separator("_")
                .try_parsing(true)
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
