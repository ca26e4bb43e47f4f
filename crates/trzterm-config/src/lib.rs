//! trzterm configuration system.
//!
//! Provides TOML-based configuration with validation. All config sections
//! use sensible defaults so partial configs work out of the box; a file with
//! out-of-range values is reported and replaced by the defaults.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use trzterm_config::load_config;
//!
//! let config = load_config(None).expect("failed to load config");
//! println!("listening on {}:{}", config.server.host, config.server.port);
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::TrztermConfig;

use std::path::Path;
use trzterm_common::ConfigError;

/// Load config from an explicit path, or from the platform default path.
///
/// The default path gets a commented template when no file exists yet; an
/// explicit path must exist.
pub fn load_config(path: Option<&Path>) -> Result<TrztermConfig, ConfigError> {
    match path {
        Some(path) => toml_loader::load_from_path(path),
        None => toml_loader::load_default(),
    }
}
