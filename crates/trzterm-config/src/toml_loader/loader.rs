//! Reading config files.

use std::io::ErrorKind;
use std::path::Path;

use trzterm_common::ConfigError;

use super::paths::{create_default_config, default_config_path};
use crate::schema::TrztermConfig;
use crate::validation;

/// Load config from a specific TOML file.
///
/// Missing fields take their defaults. A file that parses but fails
/// validation is reported in the log and replaced by the defaults.
pub fn load_from_path(path: &Path) -> Result<TrztermConfig, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        Err(e) => {
            return Err(ConfigError::ParseError(format!(
                "failed to read {}: {e}",
                path.display()
            )));
        }
    };

    let config: TrztermConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;

    match validation::validate(&config) {
        Ok(()) => {
            tracing::info!(path = %path.display(), "Loaded config");
            Ok(config)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), "{e}; using defaults");
            Ok(TrztermConfig::default())
        }
    }
}

/// Load config from [`default_config_path`], seeding a commented template
/// on first run.
pub fn load_default() -> Result<TrztermConfig, ConfigError> {
    let path = default_config_path()?;

    match load_from_path(&path) {
        Err(ConfigError::FileNotFound(_)) => {
            tracing::info!(path = %path.display(), "No config yet, writing template");
            create_default_config(&path)?;
            Ok(TrztermConfig::default())
        }
        other => other,
    }
}
