pub mod conditional;
pub mod health;
pub mod scan_artifact;
pub mod scan_delete;
pub mod scan_events;
pub mod scan_get;
pub mod scan_upload;
