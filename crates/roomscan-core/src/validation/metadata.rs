//! Metadata validation module
//!
//! Upload metadata arrives either as a JSON object or as a URL-encoded `k=v&k=v`
//! string. Both forms are checked against the same schema:
//! - `author` is required and must be a non-empty string
//! - `title`, `filename`, `platform`, `format` are optional strings
//! - no other keys are allowed

use serde_json::{Map, Value};

use crate::error::AppError;
use crate::models::ScanMetadata;

/// Keys accepted in scan metadata.
pub const ALLOWED_METADATA_KEYS: &[&str] = &["author", "title", "filename", "platform", "format"];

/// Parse and validate the raw `meta` form field.
///
/// Every offending key is collected so the client sees all problems at once.
pub fn parse_metadata(raw: &str, max_bytes: usize) -> Result<ScanMetadata, AppError> {
    if raw.len() > max_bytes {
        return Err(AppError::MetadataTooLarge {
            size: raw.len(),
            max: max_bytes,
        });
    }

    let trimmed = raw.trim();
    let fields = if trimmed.starts_with('{') {
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(map)) => map,
            _ => {
                return Err(AppError::InvalidInput(
                    "metadata is not a valid JSON object".to_string(),
                ))
            }
        }
    } else {
        parse_urlencoded(trimmed)?
    };

    validate_fields(fields)
}

fn parse_urlencoded(raw: &str) -> Result<Map<String, Value>, AppError> {
    let mut map = Map::new();
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        map.insert(decode_component(key)?, Value::String(decode_component(value)?));
    }
    Ok(map)
}

fn decode_component(raw: &str) -> Result<String, AppError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .map_err(|_| AppError::InvalidInput("metadata is not valid URL encoding".to_string()))
}

fn validate_fields(mut fields: Map<String, Value>) -> Result<ScanMetadata, AppError> {
    let mut invalid: Vec<String> = Vec::new();

    match fields.get("author") {
        Some(Value::String(author)) if !author.trim().is_empty() => {}
        _ => invalid.push("author".to_string()),
    }

    for (key, value) in &fields {
        if key == "author" {
            continue;
        }
        if !ALLOWED_METADATA_KEYS.contains(&key.as_str()) || !value.is_string() {
            invalid.push(key.clone());
        }
    }

    if !invalid.is_empty() {
        return Err(AppError::InvalidMetadata { fields: invalid });
    }

    let mut take = |key: &str| match fields.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    };

    Ok(ScanMetadata {
        author: take("author"),
        title: take("title"),
        filename: take("filename"),
        platform: take("platform"),
        format: take("format"),
    })
}
