//! Full configuration validation.
//!
//! Validates numeric ranges and required strings. Each section has its own
//! function; this orchestrator calls them all and collects errors into a
//! single `ConfigError`.

mod helpers;
mod sections;


use crate::schema::TrztermConfig;
use trzterm_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &TrztermConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    sections::validate_transfer(&mut errors, config);
    sections::validate_client(&mut errors, config);
    sections::validate_server(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
