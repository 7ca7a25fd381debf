//! Configuration loader
//!
//! Reads the part list from disk.

use super::Configuration;
use crate::UserDataError;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Load the part list configuration from a JSON file
///
/// An unreadable file and malformed JSON are both errors. A valid document
/// without `cloud_init_parts` yields an empty configuration.
pub fn load_configuration(path: impl AsRef<Path>) -> Result<Configuration, UserDataError> {
    let path = path.as_ref();

    let content = fs::read_to_string(path).map_err(|source| UserDataError::Config {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Read {} bytes of config from {}", content.len(), path.display());

    let config =
        Configuration::from_json(&content).map_err(|source| UserDataError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;

    info!(
        "Loaded {} user-data part(s) from {}",
        config.cloud_init_parts.len(),
        path.display()
    );
    Ok(config)
}
