//! Conditional GET/HEAD support (`ETag`, `Last-Modified`, 304).

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};

/// Quote a hex digest as a strong entity tag.
pub fn etag(hash: &str) -> String {
    format!("\"{}\"", hash)
}

/// Format a timestamp as an HTTP date (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Whether the request's validators match the current representation.
///
/// `If-None-Match` takes precedence: when present, `If-Modified-Since` is ignored.
pub fn is_not_modified(headers: &HeaderMap, etag: &str, modified: SystemTime) -> bool {
    if let Some(value) = headers.get(header::IF_NONE_MATCH) {
        return value
            .to_str()
            .map(|v| etag_matches(v, etag))
            .unwrap_or(false);
    }

    let Some(since) = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| DateTime::parse_from_rfc2822(v.trim()).ok())
    else {
        return false;
    };

    // HTTP dates carry whole seconds only.
    let modified_secs = modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();
    modified_secs <= since.timestamp()
}

fn etag_matches(header_value: &str, etag: &str) -> bool {
    header_value.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == etag
    })
}
