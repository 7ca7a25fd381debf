//! Output encodings for assembled user-data

use crate::UserDataError;
use base64::Engine;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use tracing::debug;

/// How the assembled document is encoded before printing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Encoding {
    /// Gzip-compress the document
    pub gzip: bool,
    /// Base64-encode the (possibly compressed) document
    pub base64: bool,
}

impl Encoding {
    /// Whether the output is raw binary that must not get a trailing newline
    pub fn is_binary(&self) -> bool {
        self.gzip && !self.base64
    }

    /// Apply gzip then base64, as configured
    pub fn apply(&self, document: Vec<u8>) -> Result<Vec<u8>, UserDataError> {
        let mut data = document;

        if self.gzip {
            let before = data.len();
            data = gzip(&data)?;
            debug!("Compressed user-data from {} to {} bytes", before, data.len());
        }

        if self.base64 {
            data = encode_base64(&data).into_bytes();
        }

        Ok(data)
    }
}

/// Standard base64 with padding on a single line
pub fn encode_base64(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

fn gzip(data: &[u8]) -> Result<Vec<u8>, UserDataError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
