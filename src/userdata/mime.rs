//! MIME multipart writing and reading for cloud-init user-data
//!
//! Produces the `multipart/mixed` documents cloud-init accepts for combining
//! several user-data parts (scripts, configs, etc.), and reads them back.

use super::FileEntry;
use super::types::ContentType;
use crate::UserDataError;
use std::collections::HashMap;
use tracing::{debug, trace};
use uuid::Uuid;

/// Boundary used when deterministic output is requested
pub const FIXED_BOUNDARY: &str = "MIMEBOUNDARY";

/// RFC 2046 caps boundaries at 70 characters
const MAX_BOUNDARY_LEN: usize = 70;

/// How the multipart boundary is chosen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Boundary {
    /// Fresh random token for every document
    #[default]
    Random,
    /// The constant [`FIXED_BOUNDARY`], so identical input gives identical output
    Fixed,
    /// Caller supplied token, validated before use
    Explicit(String),
}

impl Boundary {
    /// Produce the boundary token for one document
    pub fn resolve(&self) -> Result<String, UserDataError> {
        let token = match self {
            Self::Random => random_boundary(),
            Self::Fixed => FIXED_BOUNDARY.to_string(),
            Self::Explicit(token) => token.clone(),
        };
        validate_boundary(&token)?;
        Ok(token)
    }
}

/// Generate a random boundary token (32 lowercase hex characters)
pub fn random_boundary() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Check a boundary against the RFC 2046 `bchars` grammar
pub fn validate_boundary(boundary: &str) -> Result<(), UserDataError> {
    if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN {
        return Err(UserDataError::assembly(format!(
            "invalid boundary length {} (must be 1-{})",
            boundary.len(),
            MAX_BOUNDARY_LEN
        )));
    }

    if let Some(c) = boundary.chars().find(|c| !is_bchar(*c)) {
        return Err(UserDataError::assembly(format!(
            "invalid boundary character {:?}",
            c
        )));
    }

    if boundary.ends_with(' ') {
        return Err(UserDataError::assembly("boundary must not end with a space"));
    }

    Ok(())
}

fn is_bchar(c: char) -> bool {
    c.is_ascii_alphanumeric() || "'()+_,-./:=? ".contains(c)
}

/// Escape backslashes and double quotes for use inside a quoted header value
pub fn escape_quotes(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || c == '"' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Final `/`-delimited segment of a path, or the whole path if it has none
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Headers written for every part, in output order
pub fn part_headers(entry: &FileEntry) -> Vec<(&'static str, String)> {
    let path = entry.path.to_string_lossy();
    vec![
        (
            "Content-Type",
            format!("{}; charset=\"us-ascii\"", entry.mime_type),
        ),
        ("MIME-Version", "1.0".to_string()),
        ("Content-Transfer-Encoding", "7bit".to_string()),
        (
            "Content-Disposition",
            format!(
                "attachment; filename=\"{}\"",
                escape_quotes(basename(&path))
            ),
        ),
    ]
}

/// Incremental multipart/mixed writer over an in-memory buffer
#[derive(Debug)]
pub struct MultipartWriter {
    buf: Vec<u8>,
    boundary: String,
    parts: usize,
}

impl MultipartWriter {
    /// Create a writer using an already validated boundary
    pub fn new(boundary: impl Into<String>) -> Result<Self, UserDataError> {
        let boundary = boundary.into();
        validate_boundary(&boundary)?;
        Ok(Self {
            buf: Vec::new(),
            boundary,
            parts: 0,
        })
    }

    /// The boundary token in use
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Number of parts written so far
    pub fn parts(&self) -> usize {
        self.parts
    }

    /// Write the outer `Content-Type` header and its terminating blank line
    pub fn write_content_type(&mut self) {
        let header = format!(
            "Content-Type: multipart/mixed; boundary=\"{}\"\r\n\r\n",
            self.boundary
        );
        self.buf.extend_from_slice(header.as_bytes());
    }

    /// Append one part with the given headers and body
    ///
    /// The body is copied byte-for-byte. A body containing the delimiter
    /// would end the part early, so it is rejected.
    pub fn write_part(
        &mut self,
        headers: &[(&str, String)],
        body: &[u8],
    ) -> Result<(), UserDataError> {
        let delimiter = format!("--{}", self.boundary);
        if find(body, delimiter.as_bytes(), 0).is_some() {
            return Err(UserDataError::assembly(format!(
                "part {} contains the boundary delimiter {:?}",
                self.parts + 1,
                delimiter
            )));
        }

        if self.parts > 0 {
            self.buf.extend_from_slice(b"\r\n");
        }
        self.buf.extend_from_slice(delimiter.as_bytes());
        self.buf.extend_from_slice(b"\r\n");

        for (name, value) in headers {
            if value.contains(['\r', '\n']) {
                return Err(UserDataError::assembly(format!(
                    "header {} contains a line break",
                    name
                )));
            }
            self.buf
                .extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }
        self.buf.extend_from_slice(b"\r\n");
        self.buf.extend_from_slice(body);

        self.parts += 1;
        trace!("Wrote part {} ({} bytes)", self.parts, body.len());
        Ok(())
    }

    /// Write the closing delimiter and return the document
    pub fn finish(mut self) -> Vec<u8> {
        if self.parts > 0 {
            self.buf.extend_from_slice(b"\r\n");
        }
        self.buf
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        self.buf
    }
}

/// Assemble file entries into a complete multipart/mixed document
pub fn assemble(entries: &[FileEntry], boundary: &Boundary) -> Result<Vec<u8>, UserDataError> {
    let mut writer = MultipartWriter::new(boundary.resolve()?)?;
    debug!("Using MIME boundary: {}", writer.boundary());

    writer.write_content_type();
    for entry in entries {
        writer.write_part(&part_headers(entry), &entry.content)?;
    }

    debug!("Assembled {} MIME parts", writer.parts());
    Ok(writer.finish())
}

/// A single part read back from a multipart message
#[derive(Debug, Clone)]
pub struct MimePart {
    /// Content type of this part
    pub content_type: ContentType,
    /// MIME type without parameters
    pub mime_type: String,
    /// Body bytes
    pub content: Vec<u8>,
    /// Filename from Content-Disposition, unescaped
    pub filename: Option<String>,
    /// All headers, keyed by lower-cased name
    pub headers: HashMap<String, String>,
}

/// Parse a multipart/mixed user-data document into its parts
pub fn parse_multipart(data: &[u8]) -> Result<Vec<MimePart>, UserDataError> {
    let boundary = find_boundary(data)?;
    debug!("Found MIME boundary: {}", boundary);

    let delimiter = format!("--{}", boundary);
    let delimiter = delimiter.as_bytes();

    // Delimiters only count at the start of a line
    let mut starts = Vec::new();
    let mut from = 0;
    while let Some(idx) = find(data, delimiter, from) {
        if idx == 0 || data[idx - 1] == b'\n' {
            starts.push(idx);
        }
        from = idx + delimiter.len();
    }

    let mut parts = Vec::new();
    for (i, &start) in starts.iter().enumerate() {
        let after = start + delimiter.len();
        if data[after..].starts_with(b"--") {
            break;
        }

        // Skip transport padding to the end of the delimiter line
        let Some(line_end) = find(data, b"\n", after) else {
            break;
        };
        let body_start = line_end + 1;

        let Some(&next) = starts.get(i + 1) else {
            return Err(UserDataError::InvalidData(
                "missing closing boundary".to_string(),
            ));
        };
        // The line break before a delimiter belongs to the delimiter
        let mut body_end = next;
        if body_end > body_start && data[body_end - 1] == b'\n' {
            body_end -= 1;
            if body_end > body_start && data[body_end - 1] == b'\r' {
                body_end -= 1;
            }
        }

        parts.push(parse_part(&data[body_start..body_end.max(body_start)])?);
    }

    debug!("Parsed {} MIME parts", parts.len());
    Ok(parts)
}

/// Find the boundary parameter in the outer headers
fn find_boundary(data: &[u8]) -> Result<String, UserDataError> {
    let header_end = find(data, b"\r\n\r\n", 0)
        .or_else(|| find(data, b"\n\n", 0))
        .unwrap_or(data.len());
    let headers = String::from_utf8_lossy(&data[..header_end]);

    for line in headers.lines() {
        let lower = line.to_ascii_lowercase();
        if (lower.starts_with("content-type:") || lower.trim_start().starts_with("boundary="))
            && lower.contains("boundary=")
            && let Some(boundary) = extract_param(line, "boundary")
        {
            return Ok(boundary);
        }
    }

    Err(UserDataError::InvalidData(
        "No MIME boundary found".to_string(),
    ))
}

/// Extract a (possibly quoted) parameter value from a header value
fn extract_param(value: &str, name: &str) -> Option<String> {
    let lower = value.to_ascii_lowercase();
    let key = format!("{}=", name);
    let idx = lower.find(&key)?;
    let after = &value[idx + key.len()..];

    if let Some(quoted) = after.strip_prefix('"') {
        let mut out = String::new();
        let mut chars = quoted.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => out.push(chars.next()?),
                '"' => return Some(out),
                _ => out.push(c),
            }
        }
        None
    } else {
        let end = after
            .find(|c: char| c == ';' || c.is_whitespace())
            .unwrap_or(after.len());
        Some(after[..end].to_string())
    }
}

/// Parse a single part: headers, blank line, body
fn parse_part(data: &[u8]) -> Result<MimePart, UserDataError> {
    let (headers_raw, body) = if data.starts_with(b"\r\n") {
        (&data[..0], &data[2..])
    } else if data.starts_with(b"\n") {
        (&data[..0], &data[1..])
    } else if let Some(idx) = find(data, b"\r\n\r\n", 0) {
        (&data[..idx], &data[idx + 4..])
    } else if let Some(idx) = find(data, b"\n\n", 0) {
        (&data[..idx], &data[idx + 2..])
    } else {
        (data, &data[data.len()..])
    };

    let headers_str = String::from_utf8_lossy(headers_raw);
    let mut headers = HashMap::new();
    let mut current_header: Option<(String, String)> = None;

    for line in headers_str.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            // Continuation of previous header
            if let Some((_, ref mut value)) = current_header {
                value.push(' ');
                value.push_str(line.trim());
            }
        } else if let Some((name, value)) = line.split_once(':') {
            if let Some((n, v)) = current_header.take() {
                headers.insert(n.to_lowercase(), v);
            }
            current_header = Some((name.trim().to_string(), value.trim().to_string()));
        }
    }
    if let Some((n, v)) = current_header {
        headers.insert(n.to_lowercase(), v);
    }

    let mime_type = headers
        .get("content-type")
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_string())
        .unwrap_or_else(|| "text/plain".to_string());

    let filename = headers
        .get("content-disposition")
        .and_then(|cd| extract_param(cd, "filename"));

    let content = match headers
        .get("content-transfer-encoding")
        .map(|s| s.to_lowercase())
        .as_deref()
    {
        Some("base64") => decode_base64(body)?,
        _ => body.to_vec(),
    };

    Ok(MimePart {
        content_type: ContentType::from_mime(&mime_type),
        mime_type,
        content,
        filename,
        headers,
    })
}

fn decode_base64(data: &[u8]) -> Result<Vec<u8>, UserDataError> {
    use base64::Engine;

    let clean: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    base64::engine::general_purpose::STANDARD
        .decode(&clean)
        .map_err(|e| UserDataError::InvalidData(format!("Base64 decode error: {}", e)))
}

/// Byte substring search starting at `from`
fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(path: &str, mime_type: &str, content: &[u8]) -> FileEntry {
        FileEntry {
            path: PathBuf::from(path),
            mime_type: mime_type.to_string(),
            content: content.to_vec(),
        }
    }

    #[test]
    fn test_escape_quotes() {
        assert_eq!(escape_quotes("plain.sh"), "plain.sh");
        assert_eq!(escape_quotes(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_quotes(r"a\b"), r"a\\b");
        assert_eq!(escape_quotes(r#"\""#), r#"\\\""#);
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("scripts/setup.sh"), "setup.sh");
        assert_eq!(basename("/abs/path/config.yaml"), "config.yaml");
        assert_eq!(basename("noslash.txt"), "noslash.txt");
        assert_eq!(basename("dir/"), "");
    }

    #[test]
    fn test_validate_boundary() {
        assert!(validate_boundary("MIMEBOUNDARY").is_ok());
        assert!(validate_boundary("a'()+_,-./:=? b").is_ok());
        assert!(validate_boundary("").is_err());
        assert!(validate_boundary(&"x".repeat(71)).is_err());
        assert!(validate_boundary("trailing ").is_err());
        assert!(validate_boundary("bad\"quote").is_err());
        assert!(validate_boundary("new\nline").is_err());
    }

    #[test]
    fn test_random_boundary() {
        let a = random_boundary();
        let b = random_boundary();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert!(validate_boundary(&a).is_ok());
    }

    #[test]
    fn test_assemble_fixed_exact_output() {
        let entries = vec![
            entry("scripts/setup.sh", "text/x-shellscript", b"#!/bin/bash\necho hi\n"),
            entry("cloud.yaml", "text/cloud-config", b"#cloud-config\n"),
        ];

        let doc = assemble(&entries, &Boundary::Fixed).unwrap();
        let expected = "Content-Type: multipart/mixed; boundary=\"MIMEBOUNDARY\"\r\n\r\n\
            --MIMEBOUNDARY\r\n\
            Content-Type: text/x-shellscript; charset=\"us-ascii\"\r\n\
            MIME-Version: 1.0\r\n\
            Content-Transfer-Encoding: 7bit\r\n\
            Content-Disposition: attachment; filename=\"setup.sh\"\r\n\
            \r\n\
            #!/bin/bash\necho hi\n\
            \r\n--MIMEBOUNDARY\r\n\
            Content-Type: text/cloud-config; charset=\"us-ascii\"\r\n\
            MIME-Version: 1.0\r\n\
            Content-Transfer-Encoding: 7bit\r\n\
            Content-Disposition: attachment; filename=\"cloud.yaml\"\r\n\
            \r\n\
            #cloud-config\n\
            \r\n--MIMEBOUNDARY--\r\n";

        assert_eq!(String::from_utf8(doc).unwrap(), expected);
    }

    #[test]
    fn test_assemble_empty() {
        let doc = assemble(&[], &Boundary::Fixed).unwrap();
        assert_eq!(
            doc,
            b"Content-Type: multipart/mixed; boundary=\"MIMEBOUNDARY\"\r\n\r\n--MIMEBOUNDARY--\r\n"
        );
        assert!(parse_multipart(&doc).unwrap().is_empty());
    }

    #[test]
    fn test_assemble_escapes_filename() {
        let entries = vec![entry(r#"dir/we"ird\name.sh"#, "text/x-shellscript", b"x")];
        let doc = String::from_utf8(assemble(&entries, &Boundary::Fixed).unwrap()).unwrap();
        assert!(doc.contains(r#"filename="we\"ird\\name.sh""#));

        let parts = parse_multipart(doc.as_bytes()).unwrap();
        assert_eq!(parts[0].filename.as_deref(), Some(r#"we"ird\name.sh"#));
    }

    #[test]
    fn test_assemble_invalid_explicit_boundary() {
        let err = assemble(&[], &Boundary::Explicit("bad\"boundary".to_string())).unwrap_err();
        assert!(matches!(err, UserDataError::Assembly(_)));
        assert!(err.to_string().starts_with("Error building userdata"));
    }

    #[test]
    fn test_assemble_rejects_boundary_collision() {
        let entries = vec![entry("a.txt", "text/plain", b"line\n--MIMEBOUNDARY\nmore")];
        let err = assemble(&entries, &Boundary::Fixed).unwrap_err();
        assert!(err.to_string().contains("boundary delimiter"));
    }

    #[test]
    fn test_random_boundary_differs_only_in_token() {
        let entries = vec![entry("a.sh", "text/x-shellscript", b"echo a")];
        let a = assemble(&entries, &Boundary::Random).unwrap();
        let b = assemble(&entries, &Boundary::Random).unwrap();
        assert_ne!(a, b);

        let a = String::from_utf8(a).unwrap();
        let token = find_boundary(a.as_bytes()).unwrap();
        let fixed = String::from_utf8(assemble(&entries, &Boundary::Fixed).unwrap()).unwrap();
        assert_eq!(a.replace(&token, FIXED_BOUNDARY), fixed);
    }

    #[test]
    fn test_round_trip_binary_content() {
        let binary: Vec<u8> = (0u8..=255).collect();
        let entries = vec![
            entry("bin/blob", "application/octet-stream", &binary),
            entry("empty", "text/plain", b""),
            entry("crlf.txt", "text/plain", b"a\r\nb\r\n"),
        ];

        let doc = assemble(&entries, &Boundary::Random).unwrap();
        let parts = parse_multipart(&doc).unwrap();

        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].content, binary);
        assert_eq!(parts[0].filename.as_deref(), Some("blob"));
        assert_eq!(parts[1].content, b"");
        assert_eq!(parts[2].content, b"a\r\nb\r\n");
        assert_eq!(parts[2].headers.get("mime-version").map(String::as_str), Some("1.0"));
    }

    #[test]
    fn test_parse_lf_multipart() {
        let data = br#"MIME-Version: 1.0
Content-Type: multipart/mixed; boundary="BOUNDARY"

--BOUNDARY
Content-Type: text/cloud-config
Content-Disposition: attachment; filename=setup.yaml

#cloud-config
hostname: test
--BOUNDARY
Content-Type: text/x-shellscript

#!/bin/bash
echo hello
--BOUNDARY--
"#;

        let parts = parse_multipart(data).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].content_type, ContentType::CloudConfig);
        assert_eq!(parts[0].filename.as_deref(), Some("setup.yaml"));
        assert_eq!(parts[0].content, b"#cloud-config\nhostname: test");
        assert_eq!(parts[1].content_type, ContentType::Script);
        assert_eq!(parts[1].content, b"#!/bin/bash\necho hello");
    }

    #[test]
    fn test_parse_base64_content() {
        let data = b"Content-Type: multipart/mixed; boundary=test\n\n--test\nContent-Type: text/plain\nContent-Transfer-Encoding: base64\n\nSGVsbG8gV29ybGQh\n--test--\n";

        let parts = parse_multipart(data).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].content, b"Hello World!");
    }

    #[test]
    fn test_parse_without_boundary() {
        assert!(parse_multipart(b"#cloud-config\nhostname: x\n").is_err());
    }

    #[test]
    fn test_extract_param() {
        assert_eq!(
            extract_param("attachment; filename=\"test.sh\"", "filename"),
            Some("test.sh".to_string())
        );
        assert_eq!(
            extract_param("attachment; filename=script.sh", "filename"),
            Some("script.sh".to_string())
        );
        assert_eq!(
            extract_param("multipart/mixed; Boundary=\"abc 123\"", "boundary"),
            Some("abc 123".to_string())
        );
    }

    #[test]
    fn test_extract_param_after_non_ascii() {
        assert_eq!(
            extract_param("attachment; name=\"İİİ\"; filename=\"x.sh\"", "filename"),
            Some("x.sh".to_string())
        );
        assert_eq!(
            extract_param("attachment; name=\"İİ\"; filename=\"éé.sh\"", "filename"),
            Some("éé.sh".to_string())
        );
    }

    #[test]
    fn test_parse_non_ascii_headers() {
        let data = "Content-Type: multipart/mixed; name=\"İİ\"; boundary=\"B\"\r\n\r\n\
            --B\r\n\
            Content-Type: text/x-shellscript\r\n\
            Content-Disposition: attachment; name=\"İİİ\"; filename=\"éé.sh\"\r\n\
            \r\n\
            echo hi\
            \r\n--B--\r\n";

        let parts = parse_multipart(data.as_bytes()).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].filename.as_deref(), Some("éé.sh"));
        assert_eq!(parts[0].content, b"echo hi");
    }
}
