use roomscan_core::Config;
use roomscan_processing::FileTypeValidator;
use roomscan_storage::{JobStore, ScratchArea};
use roomscan_worker::{JobQueue, ProgressHub};

/// Shared handler state.
pub struct AppState {
    pub config: Config,
    pub store: JobStore,
    pub scratch: ScratchArea,
    pub queue: JobQueue,
    pub hub: ProgressHub,
    pub validator: FileTypeValidator,
}
