//! RoomScan Core Library
//!
//! This crate provides the domain models, error types, configuration, and validation
//! shared by the storage, processing, worker, and API crates.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod validation;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{JobId, JobRecord, JobStatus, ProgressEvent, ScanMetadata};
pub use validation::{parse_metadata, sanitize_filename};
