//! User-data assembly
//!
//! Handles turning a list of local files into cloud-init user-data:
//! - Loading part files from disk
//! - Writing the multipart/mixed MIME document
//! - Gzip and base64 output encodings
//! - Reading a generated document back into parts

pub mod encode;
pub mod mime;
pub mod types;

pub use encode::Encoding;
pub use mime::{Boundary, FIXED_BOUNDARY, MimePart, assemble, parse_multipart};
pub use types::ContentType;

use crate::UserDataError;
use crate::config::PartSpec;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// A part file loaded into memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path the content was read from
    pub path: PathBuf,
    /// MIME type declared in the configuration
    pub mime_type: String,
    /// Raw file bytes
    pub content: Vec<u8>,
}

impl FileEntry {
    /// Read the file named by a part spec
    pub fn load(spec: &PartSpec) -> Result<Self, UserDataError> {
        let content = fs::read(&spec.path).map_err(|source| UserDataError::ReadFile {
            path: spec.path.clone(),
            source,
        })?;
        debug!(
            "Loaded {} ({} bytes, {})",
            spec.path.display(),
            content.len(),
            spec.mime_type
        );

        if !ContentType::from_mime(&spec.mime_type).is_known() {
            warn!(
                "{}: content type {} is not handled by cloud-init",
                spec.path.display(),
                spec.mime_type
            );
        }

        Ok(Self {
            path: spec.path.clone(),
            mime_type: spec.mime_type.clone(),
            content,
        })
    }
}

/// Load every part file in order, stopping at the first failure
pub fn load_files(specs: &[PartSpec]) -> Result<Vec<FileEntry>, UserDataError> {
    specs.iter().map(FileEntry::load).collect()
}
