//! Conversion tool abstraction
//!
//! The conversion engine is an external black box. Callers only rely on the
//! [`Converter`] contract: given an input and an output path, run to completion,
//! report percentages through the progress channel, and return `Ok(())` only when the
//! tool itself reported success. Whether the artifact actually exists is checked by
//! the caller.

mod command;

pub use command::CommandConverter;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

/// Channel the converter reports raw percentages on.
pub type ProgressSender = mpsc::UnboundedSender<u8>;

#[derive(Debug, thiserror::Error)]
pub enum ConverterError {
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Converter exited with status {code:?}")]
    Exit {
        code: Option<i32>,
        stderr_tail: String,
    },

    #[error("Converter probe timed out after {0:?}")]
    ProbeTimeout(Duration),

    #[error("Converter probe failed: {0}")]
    ProbeFailed(String),

    #[error("Invalid converter configuration: {0}")]
    Config(String),

    #[error("IO error while running converter: {0}")]
    Io(#[from] std::io::Error),
}

impl ConverterError {
    /// Short reason safe to store on a job record.
    pub fn job_reason(&self) -> String {
        match self {
            ConverterError::Launch { .. } => "converter could not be launched".to_string(),
            ConverterError::Exit { code: Some(code), .. } => {
                format!("converter exited with code {}", code)
            }
            ConverterError::Exit { code: None, .. } => "converter was terminated".to_string(),
            ConverterError::ProbeTimeout(_) | ConverterError::ProbeFailed(_) => {
                "converter unavailable".to_string()
            }
            ConverterError::Config(_) | ConverterError::Io(_) => "conversion failed".to_string(),
        }
    }
}

#[async_trait]
pub trait Converter: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Check the tool is invocable, returning its version line.
    async fn probe(&self, timeout: Duration) -> Result<String, ConverterError>;

    /// Convert `input` into `output`, sending percentages on `progress` as they appear.
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        progress: ProgressSender,
    ) -> Result<(), ConverterError>;
}
