//! Error types for cloud-userdata

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for building user-data
#[derive(Error, Debug)]
pub enum UserDataError {
    #[error("Unable to open config file {}: {source}", path.display())]
    Config {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unable to parse config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid cloud_init_parts entry {index}: expected [path, type], got {len} element(s)")]
    InvalidEntry { index: usize, len: usize },

    #[error("Unable to open user data file: {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Error building userdata: {0}")]
    Assembly(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UserDataError {
    /// Create an assembly error
    pub fn assembly(message: impl Into<String>) -> Self {
        Self::Assembly(message.into())
    }
}
