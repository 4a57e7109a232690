//! Upload file-type checks
//!
//! An upload passes only if three independent signals agree with one per-extension
//! allow-list: the file extension, the declared `Content-Type`, and the MIME type
//! sniffed from the leading bytes.

use std::path::Path;

/// Allowed MIME types per scan extension. The same list is used for the declared
/// content type and for the sniffed type.
const FILE_TYPES: &[(&str, &[&str])] = &[
    ("obj", &["text/plain", "model/obj", "application/octet-stream"]),
    ("ply", &["model/ply", "application/ply", "text/plain", "application/octet-stream"]),
    ("usd", &["model/vnd.usd", "model/vnd.usda", "application/octet-stream"]),
    ("usda", &["model/vnd.usda", "text/plain", "application/octet-stream"]),
    ("usdc", &["model/vnd.usd", "application/octet-stream"]),
    (
        "usdz",
        &["model/vnd.usdz+zip", "model/vnd.pixar.usd", "application/zip", "application/octet-stream"],
    ),
    ("glb", &["model/gltf-binary", "application/octet-stream"]),
    ("gltf", &["model/gltf+json", "application/json", "text/plain", "application/octet-stream"]),
    ("fbx", &["application/octet-stream", "text/plain"]),
    ("stl", &["model/stl", "application/sla", "text/plain", "application/octet-stream"]),
];

#[derive(Debug, thiserror::Error)]
pub enum FileTypeError {
    #[error("File name has no extension: {0}")]
    MissingExtension(String),

    #[error("Invalid file extension: {0}")]
    InvalidExtension(String),

    #[error("Content type {content_type} not allowed for .{extension}")]
    InvalidContentType {
        content_type: String,
        extension: String,
    },

    #[error("File content looks like {sniffed}, not allowed for .{extension}")]
    ContentMismatch { sniffed: String, extension: String },
}

/// Validates uploads against the scan file-type table.
#[derive(Debug, Clone, Default)]
pub struct FileTypeValidator {
    skip_sniff: bool,
}

impl FileTypeValidator {
    pub fn new(skip_sniff: bool) -> Self {
        Self { skip_sniff }
    }

    /// Run all checks and return the normalized extension.
    pub fn validate(
        &self,
        filename: &str,
        content_type: Option<&str>,
        head: &[u8],
    ) -> Result<String, FileTypeError> {
        let extension = extension_of(filename)?;
        let allowed = allowed_types(&extension)
            .ok_or_else(|| FileTypeError::InvalidExtension(extension.clone()))?;

        let declared = normalize_content_type(content_type.unwrap_or("application/octet-stream"));
        if !allowed.contains(&declared.as_str()) {
            return Err(FileTypeError::InvalidContentType {
                content_type: declared,
                extension,
            });
        }

        if !self.skip_sniff {
            let sniffed = sniff_mime(head);
            if !allowed.contains(&sniffed) {
                return Err(FileTypeError::ContentMismatch {
                    sniffed: sniffed.to_string(),
                    extension,
                });
            }
        }

        Ok(extension)
    }
}

pub fn allowed_types(extension: &str) -> Option<&'static [&'static str]> {
    FILE_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, types)| *types)
}

/// Lower-cased extension of an upload's file name.
pub fn extension_of(filename: &str) -> Result<String, FileTypeError> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .filter(|e| !e.is_empty())
        .ok_or_else(|| FileTypeError::MissingExtension(filename.to_string()))
}

/// Strip MIME parameters (`; charset=...`) and lower-case.
pub fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

/// Best-guess MIME type from the first bytes of a file.
pub fn sniff_mime(head: &[u8]) -> &'static str {
    if head.starts_with(b"PK\x03\x04") {
        return "model/vnd.usdz+zip";
    }
    if head.starts_with(b"PXR-USDC") {
        return "model/vnd.usd";
    }
    if head.starts_with(b"#usda") {
        return "model/vnd.usda";
    }
    if head.starts_with(b"ply\n") || head.starts_with(b"ply\r\n") {
        return "model/ply";
    }
    if head.starts_with(b"glTF") {
        return "model/gltf-binary";
    }
    if head.starts_with(b"Kaydara FBX Binary") {
        return "application/octet-stream";
    }
    if head.starts_with(b"solid ") {
        return "model/stl";
    }
    if is_text(head) {
        return "text/plain";
    }
    "application/octet-stream"
}

fn is_text(head: &[u8]) -> bool {
    if head.is_empty() || head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        // The sniff window may cut a multi-byte character in half.
        Err(e) => e.error_len().is_none(),
    }
}
