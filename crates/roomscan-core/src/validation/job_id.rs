//! Job id shape check
//!
//! Job ids are lower-case hyphenated UUIDs: `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`.
//! Anything else is rejected before a filesystem path is built from it.

const HYPHENS: [usize; 4] = [8, 13, 18, 23];

/// Returns true if `raw` has the fixed 36-character job id shape.
pub fn is_valid_job_id(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    bytes.iter().enumerate().all(|(i, b)| {
        if HYPHENS.contains(&i) {
            *b == b'-'
        } else {
            matches!(b, b'0'..=b'9' | b'a'..=b'f')
        }
    })
}
