//! RoomScan Processing Library
//!
//! Everything that inspects or transforms scan bytes: upload file-type checks, the
//! [`Converter`] abstraction over the external conversion tool, and the parser that
//! pulls progress percentages out of the tool's output.

pub mod converter;
pub mod progress;
pub mod validator;

pub use converter::{CommandConverter, Converter, ConverterError, ProgressSender};
pub use progress::ProgressParser;
pub use validator::{FileTypeError, FileTypeValidator};
