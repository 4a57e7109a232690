//! Validation modules

pub mod filename;
pub mod job_id;
pub mod metadata;

pub use filename::sanitize_filename;
pub use job_id::is_valid_job_id;
pub use metadata::{parse_metadata, ALLOWED_METADATA_KEYS};
