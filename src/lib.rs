//! cloud-userdata library
//!
//! Builds cloud-init multipart/mixed user-data from a JSON list of local
//! files and their MIME types.
//!
//! The whole pipeline is one synchronous pass:
//!
//! ```text
//! load_configuration -> load_files -> assemble -> Encoding::apply
//! ```

pub mod config;
pub mod userdata;

mod error;

pub use error::UserDataError;
pub use userdata::{Boundary, Encoding, FileEntry};

use std::path::Path;
use tracing::info;

/// Options controlling how a document is built
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Boundary selection
    pub boundary: Boundary,
    /// Output encoding
    pub encoding: Encoding,
}

/// Build encoded user-data from a configuration file
///
/// Fails without producing anything if the configuration or any listed file
/// cannot be read.
pub fn build_userdata(
    config_path: impl AsRef<Path>,
    options: &BuildOptions,
) -> Result<Vec<u8>, UserDataError> {
    let config = config::load_configuration(config_path)?;
    let specs = config.parts()?;
    let entries = userdata::load_files(&specs)?;

    let document = userdata::assemble(&entries, &options.boundary)?;
    info!(
        "Built user-data with {} part(s), {} bytes",
        entries.len(),
        document.len()
    );

    options.encoding.apply(document)
}
