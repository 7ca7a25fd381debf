//! User-data content types recognised by cloud-init
//!
//! Used to flag parts whose MIME type cloud-init would not act on. The type
//! string is always echoed into the output unchanged.

use std::fmt;

/// Content types cloud-init dispatches on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// Cloud-config YAML
    CloudConfig,
    /// Cloud-config archive (YAML list of parts)
    CloudConfigArchive,
    /// Shell script run once per instance by scripts-user
    Script,
    /// Shell script run on every boot
    ScriptPerBoot,
    /// Shell script run once per instance
    ScriptPerInstance,
    /// Shell script run once ever
    ScriptPerOnce,
    /// Include file (list of URLs to fetch)
    IncludeUrl,
    /// Include-once file
    IncludeOnceUrl,
    /// Cloud boothook (runs very early)
    CloudBoothook,
    /// Jinja template
    JinjaTemplate,
    /// Part handler (Python)
    PartHandler,
    /// Upstart job (legacy)
    UpstartJob,
    /// Gzip compressed data
    Gzip,
    /// Anything cloud-init does not handle
    Unknown,
}

impl ContentType {
    /// Get the canonical MIME type string for this content type
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::CloudConfig => "text/cloud-config",
            Self::CloudConfigArchive => "text/cloud-config-archive",
            Self::Script => "text/x-shellscript",
            Self::ScriptPerBoot => "text/x-shellscript-per-boot",
            Self::ScriptPerInstance => "text/x-shellscript-per-instance",
            Self::ScriptPerOnce => "text/x-shellscript-per-once",
            Self::IncludeUrl => "text/x-include-url",
            Self::IncludeOnceUrl => "text/x-include-once-url",
            Self::CloudBoothook => "text/cloud-boothook",
            Self::JinjaTemplate => "text/jinja2",
            Self::PartHandler => "text/part-handler",
            Self::UpstartJob => "text/upstart-job",
            Self::Gzip => "application/x-gzip",
            Self::Unknown => "application/octet-stream",
        }
    }

    /// Parse content type from a MIME type string (parameters are ignored)
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_lowercase();
        let mime = mime.split(';').next().unwrap_or(&mime).trim();

        match mime {
            "text/cloud-config" | "text/x-cloud-config" => Self::CloudConfig,
            "text/cloud-config-archive" => Self::CloudConfigArchive,
            "text/x-shellscript" | "text/x-sh" => Self::Script,
            "text/x-shellscript-per-boot" => Self::ScriptPerBoot,
            "text/x-shellscript-per-instance" => Self::ScriptPerInstance,
            "text/x-shellscript-per-once" => Self::ScriptPerOnce,
            "text/x-include-url" => Self::IncludeUrl,
            "text/x-include-once-url" => Self::IncludeOnceUrl,
            "text/cloud-boothook" => Self::CloudBoothook,
            "text/jinja2" | "text/x-jinja2" => Self::JinjaTemplate,
            "text/part-handler" => Self::PartHandler,
            "text/upstart-job" => Self::UpstartJob,
            "application/x-gzip" | "application/gzip" => Self::Gzip,
            _ => Self::Unknown,
        }
    }

    /// Whether cloud-init has a handler for this type
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mime_type())
    }
}
