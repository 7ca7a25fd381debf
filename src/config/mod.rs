//! User-data part list configuration
//!
//! Handles parsing of the JSON document that lists the files to combine:
//!
//! ```json
//! { "cloud_init_parts": [["scripts/setup.sh", "text/x-shellscript"]] }
//! ```

pub mod loader;

pub use loader::load_configuration;

use crate::UserDataError;
use serde::Deserialize;
use std::path::PathBuf;

/// Top-level configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Ordered `[path, mime-type]` pairs
    pub cloud_init_parts: Vec<Vec<String>>,
}

/// One validated entry from `cloud_init_parts`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartSpec {
    /// Source file path (relative to the working directory or absolute)
    pub path: PathBuf,
    /// MIME content type, echoed into the part header unchanged
    pub mime_type: String,
}

impl Configuration {
    /// Parse configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Validate entries into part specs, preserving declaration order
    ///
    /// Every entry needs at least a path and a type. Anything after the
    /// second element is ignored.
    pub fn parts(&self) -> Result<Vec<PartSpec>, UserDataError> {
        self.cloud_init_parts
            .iter()
            .enumerate()
            .map(|(index, entry)| match entry.as_slice() {
                [path, mime_type, ..] => Ok(PartSpec {
                    path: PathBuf::from(path),
                    mime_type: mime_type.clone(),
                }),
                _ => Err(UserDataError::InvalidEntry {
                    index,
                    len: entry.len(),
                }),
            })
            .collect()
    }
}
