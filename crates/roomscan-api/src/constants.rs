/// Prefix of every versioned route.
pub const API_PREFIX: &str = "/api";

/// Extra request-body allowance on the upload route for multipart framing and `meta`.
pub const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

pub const ARTIFACT_CACHE_CONTROL: &str = "private, max-age=0, must-revalidate";
pub const INFO_CACHE_CONTROL: &str = "no-cache";
