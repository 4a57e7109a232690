//! RoomScan Storage Library
//!
//! Filesystem persistence for scan jobs.
//!
//! # Layout
//!
//! Every job owns one directory under the storage root, named after its id:
//!
//! - `<root>/<id>/info.json`: the job record, replaced atomically on every write
//! - `<root>/<id>/input.<ext>`: the uploaded scan, removed once conversion finishes
//! - `<root>/<id>/room.glb`: the converted artifact, present only when the job is done
//!
//! Uploads are streamed into a separate scratch area first and only moved into the job
//! directory after they pass validation.

pub mod error;
pub mod hash;
pub mod scratch;
pub mod store;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use scratch::{ScratchArea, ScratchFile};
pub use store::{ArtifactInfo, InfoSnapshot, JobStore};
