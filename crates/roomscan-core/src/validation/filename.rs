//! Display filename sanitization for `Content-Disposition`.

use crate::constants::DEFAULT_FILENAME;

/// Reduces a client-supplied filename to a safe display name.
///
/// Takes the last path component, strips `/` and `\` plus C0/C1 control characters,
/// trims whitespace, and falls back to `room.glb` when nothing usable remains.
pub fn sanitize_filename(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return DEFAULT_FILENAME.to_string();
    };

    let base = raw.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !matches!(c, '/' | '\\'))
        .filter(|c| !is_control(*c))
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        cleaned.to_string()
    }
}

fn is_control(c: char) -> bool {
    matches!(c as u32, 0x00..=0x1f | 0x7f..=0x9f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_filename_uses_default() {
        assert_eq!(sanitize_filename(None), "room.glb");
    }

    #[test]
    fn test_strips_traversal_and_separators() {
        assert_eq!(sanitize_filename(Some("../evil\\name.glb")), "evilname.glb");
        assert_eq!(sanitize_filename(Some("a/b/c.glb")), "c.glb");
        assert_eq!(sanitize_filename(Some("dir\\..\\scan.glb")), "dir..scan.glb");
    }

    #[test]
    fn test_strips_control_characters() {
        assert_eq!(sanitize_filename(Some("ro\u{0}om\n.glb")), "room.glb");
        assert_eq!(sanitize_filename(Some("scan\u{85}.glb")), "scan.glb");
    }

    #[test]
    fn test_directory_references_fall_back() {
        assert_eq!(sanitize_filename(Some("")), "room.glb");
        assert_eq!(sanitize_filename(Some("   ")), "room.glb");
        assert_eq!(sanitize_filename(Some(".")), "room.glb");
        assert_eq!(sanitize_filename(Some("..")), "room.glb");
        assert_eq!(sanitize_filename(Some("/../")), "room.glb");
    }

    #[test]
    fn test_keeps_ordinary_names() {
        assert_eq!(sanitize_filename(Some("Living Room.glb")), "Living Room.glb");
    }
}
