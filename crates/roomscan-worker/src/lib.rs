//! RoomScan Worker Library
//!
//! Background machinery behind the HTTP surface:
//! - [`JobQueue`]: bounded FIFO admission and a fixed-width worker pool
//! - [`ConversionRunner`]: drives one job through the converter and the job store
//! - [`ProgressHub`]: per-job publish/subscribe for live progress
//! - [`RetentionSweeper`]: periodic removal of expired jobs and stale uploads

pub mod cleanup;
pub mod progress_hub;
pub mod queue;
pub mod runner;

pub use cleanup::{RetentionSweeper, SweepMode, SweepReport};
pub use progress_hub::{ProgressHub, ProgressSubscription};
pub use queue::{JobHandler, JobQueue, QueueError, QueueSlot};
pub use runner::ConversionRunner;
