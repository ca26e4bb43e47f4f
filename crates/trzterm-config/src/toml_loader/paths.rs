//! Where the config file lives, and seeding it on first run.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use trzterm_common::ConfigError;

use super::template::default_config_toml;

/// Environment variable that points at a config file, bypassing the
/// platform directory.
pub const CONFIG_ENV: &str = "TRZTERM_CONFIG";

fn resolve_config_path(
    env_override: Option<PathBuf>,
    config_dir: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = env_override.filter(|p| !p.as_os_str().is_empty()) {
        return Ok(path);
    }
    config_dir
        .map(|dir| dir.join("trzterm").join("config.toml"))
        .ok_or_else(|| ConfigError::ParseError("could not determine config directory".into()))
}

/// `$TRZTERM_CONFIG`, else `<config dir>/trzterm/config.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    resolve_config_path(
        std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        dirs::config_dir(),
    )
}

/// Write the commented template to `path` unless something is already there.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    let io_error = |what: &str, e: std::io::Error| {
        ConfigError::ParseError(format!("failed to {what} {}: {e}", path.display()))
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_error("create directory for", e))?;
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            tracing::debug!(path = %path.display(), "Config appeared meanwhile, leaving it");
            return Ok(());
        }
        Err(e) => return Err(io_error("create", e)),
    };
    file.write_all(default_config_toml().as_bytes())
        .map_err(|e| io_error("write", e))?;

    tracing::info!(path = %path.display(), "Created default config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_override_wins() {
        let path = resolve_config_path(
            Some(PathBuf::from("/etc/trzterm.toml")),
            Some(PathBuf::from("/home/u/.config")),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/etc/trzterm.toml"));
    }

    #[test]
    fn empty_override_is_ignored() {
        let path =
            resolve_config_path(Some(PathBuf::new()), Some(PathBuf::from("/home/u/.config")))
                .unwrap();
        assert_eq!(path, PathBuf::from("/home/u/.config/trzterm/config.toml"));
    }

    #[test]
    fn no_directory_is_an_error() {
        assert!(resolve_config_path(None, None).is_err());
    }

    #[test]
    fn existing_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 1\n").unwrap();

        create_default_config(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[server]\nport = 1\n"
        );
    }
}
