use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::{Path, PathBuf};

use super::{types::Config, ConfigError};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Config file location from `MEDIAMANAGER_CONFIG`, else `config.toml`.
pub fn config_path_from_env() -> PathBuf {
    std::env::var_os("MEDIAMANAGER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from file with environment variable overrides.
///
/// Nested keys are separated by `__`, e.g.
/// `MEDIAMANAGER_TORRENTS__UPDATE_INTERVAL_SECS=600`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(
            Env::prefixed("MEDIAMANAGER_")
                .ignore(&["CONFIG"])
                .split("__"),
        )
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
