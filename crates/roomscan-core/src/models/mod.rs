//! Data models for the application
//!
//! The job record persisted per scan, the metadata schema clients attach to an
//! upload, and the event pushed to progress subscribers.

mod job;
mod metadata;
mod progress;

pub use job::*;
pub use metadata::*;
pub use progress::*;
