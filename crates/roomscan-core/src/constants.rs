//! Application-wide constants

/// File name of the persisted job record inside a job directory.
pub const INFO_FILENAME: &str = "info.json";

/// File name of the converted artifact inside a job directory.
pub const OUTPUT_FILENAME: &str = "room.glb";

/// Display filename used when metadata does not provide a usable one.
pub const DEFAULT_FILENAME: &str = "room.glb";

/// Prefix of the stored input file (`input.<ext>`).
pub const INPUT_STEM: &str = "input";

/// MIME type of the converted artifact.
pub const GLB_CONTENT_TYPE: &str = "model/gltf-binary";

/// Suffix of in-flight upload files in the scratch area.
pub const SCRATCH_SUFFIX: &str = ".part";

/// Number of leading bytes kept from an upload for content sniffing.
pub const SNIFF_LEN: usize = 512;

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 100;

/// Reason recorded on jobs found unfinished when the service starts.
pub const INTERRUPTED_REASON: &str = "interrupted by server restart";
