//! Scripted stand-in for the external conversion tool.

#![allow(dead_code)]

use async_trait::async_trait;
use roomscan_processing::{Converter, ConverterError, ProgressSender};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Bytes written as the converted artifact.
pub const FAKE_GLB: &[u8] = b"glTF\x02\x00\x00\x00fake-room-scan";

/// Reports `before_gate`, waits for a permit, then reports `after_gate` and writes
/// [`FAKE_GLB`] (or fails with `exit_code`).
pub struct FakeConverter {
    gate: Arc<Semaphore>,
    before_gate: Vec<u8>,
    after_gate: Vec<u8>,
    exit_code: Option<i32>,
}

impl FakeConverter {
    /// Converts immediately.
    pub fn open() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
            before_gate: vec![10],
            after_gate: vec![60, 100],
            exit_code: None,
        }
    }

    /// Blocks every conversion until [`FakeConverter::release`] is called.
    pub fn gated() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            ..Self::open()
        }
    }

    pub fn failing(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            ..Self::open()
        }
    }

    pub fn gate(&self) -> Arc<Semaphore> {
        self.gate.clone()
    }
}

/// Let all current and future conversions through.
pub fn release(gate: &Semaphore) {
    gate.add_permits(Semaphore::MAX_PERMITS >> 4);
}

#[async_trait]
impl Converter for FakeConverter {
    fn name(&self) -> &str {
        "fake"
    }

    async fn probe(&self, _timeout: Duration) -> Result<String, ConverterError> {
        Ok("fake 1.0".to_string())
    }

    async fn convert(
        &self,
        _input: &Path,
        output: &Path,
        progress: ProgressSender,
    ) -> Result<(), ConverterError> {
        for pct in &self.before_gate {
            let _ = progress.send(*pct);
        }

        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ConverterError::Exit {
                code: None,
                stderr_tail: String::new(),
            })?;

        for pct in &self.after_gate {
            let _ = progress.send(*pct);
        }

        if let Some(code) = self.exit_code {
            return Err(ConverterError::Exit {
                code: Some(code),
                stderr_tail: "boom".to_string(),
            });
        }

        tokio::fs::write(output, FAKE_GLB).await?;
        Ok(())
    }
}
