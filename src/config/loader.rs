//! Configuration loading from disk and the environment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::fs;
use std::str::FromStr;
use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Env file error: {0}")]
    EnvFile(#[from] dotenvy::Error),

    #[error("Environment variable {var} has invalid value {value:?}")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse a TOML file without validating it.
pub fn read_config_file(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let config = read_config_file(path)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load a `.env` file from the working directory (or a parent) into the process
/// environment. Variables already set are kept. A missing file is not an error.
pub fn load_dotenv() -> Result<Option<PathBuf>, ConfigError> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Parse an env file without touching the process environment.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let vars = dotenvy::from_path_iter(path)?.collect::<Result<HashMap<_, _>, _>>()?;
    Ok(vars)
}

/// Apply environment overrides using `lookup` to read variables.
///
/// Recognised variables: `PORT`, `ORIGIN_SERVER_URL`, `RATE_LIMIT_RPS`,
/// `RATE_LIMIT_BURST`, `RATE_LIMIT_ENABLED`, `RATE_LIMIT_CLEANUP_SECS`.
pub fn apply_env_overrides<F>(config: &mut ProxyConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("PORT") {
        let port: u16 = parse_var("PORT", &port)?;
        config.listener.bind_address = format!("0.0.0.0:{}", port);
    }
    if let Some(url) = lookup("ORIGIN_SERVER_URL") {
        config.origin.url = url;
    }
    if let Some(rps) = lookup("RATE_LIMIT_RPS") {
        config.rate_limit.requests_per_second = parse_var("RATE_LIMIT_RPS", &rps)?;
    }
    if let Some(burst) = lookup("RATE_LIMIT_BURST") {
        config.rate_limit.burst_size = parse_var("RATE_LIMIT_BURST", &burst)?;
    }
    if let Some(enabled) = lookup("RATE_LIMIT_ENABLED") {
        config.rate_limit.enabled = parse_bool("RATE_LIMIT_ENABLED", &enabled)?;
    }
    if let Some(secs) = lookup("RATE_LIMIT_CLEANUP_SECS") {
        config.rate_limit.cleanup_interval_secs = parse_var("RATE_LIMIT_CLEANUP_SECS", &secs)?;
    }
    Ok(())
}

/// Build the effective configuration: defaults, optional file, process
/// environment, then `overrides` (command-line flags). The result is validated.
pub fn load_effective_config<F>(path: Option<&Path>, overrides: F) -> Result<ProxyConfig, ConfigError>
where
    F: FnOnce(&mut ProxyConfig),
{
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => ProxyConfig::default(),
    };
    apply_env_overrides(&mut config, |var| std::env::var(var).ok())?;
    overrides(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

fn parse_var<T: FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var,
        value: value.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Ok(true),
        "0" | "f" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Env {
            var,
            value: value.to_string(),
        }),
    }
}
