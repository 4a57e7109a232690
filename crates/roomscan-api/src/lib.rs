//! RoomScan API Library
//!
//! This crate provides the HTTP handlers, middleware, and application setup.

mod api_doc;
pub mod constants;
mod handlers;
mod middleware;
pub mod setup;
pub mod telemetry;

// Public modules
pub mod auth;
pub mod error;
pub mod state;

// Re-exports
pub use error::{ErrorResponse, HttpAppError};
pub use state::AppState;
