//! Subprocess-backed converter (Blender by default).

use async_trait::async_trait;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use roomscan_core::Config;

use super::{Converter, ConverterError, ProgressSender};
use crate::progress::ProgressParser;

const INPUT_PLACEHOLDER: &str = "{input}";
const OUTPUT_PLACEHOLDER: &str = "{output}";
const STDERR_TAIL_LINES: usize = 20;

/// Runs an external program with an argument template.
///
/// Each template argument may contain `{input}` and `{output}`; they are replaced with
/// the job's paths. Progress is read from stdout line by line.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: String,
    args_template: Vec<String>,
    verbose: bool,
    parser: ProgressParser,
}

impl CommandConverter {
    pub fn new(
        program: impl Into<String>,
        args_template: Vec<String>,
        verbose: bool,
    ) -> Result<Self, ConverterError> {
        let program = program.into();
        if program.trim().is_empty() {
            return Err(ConverterError::Config("program must not be empty".to_string()));
        }
        let joined = args_template.join(" ");
        if !joined.contains(INPUT_PLACEHOLDER) || !joined.contains(OUTPUT_PLACEHOLDER) {
            return Err(ConverterError::Config(
                "argument template must contain {input} and {output}".to_string(),
            ));
        }
        let parser = ProgressParser::new()
            .map_err(|e| ConverterError::Config(format!("progress pattern: {}", e)))?;

        Ok(Self {
            program,
            args_template,
            verbose,
            parser,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConverterError> {
        Self::new(
            config.converter_path.clone(),
            config.converter_args.clone(),
            config.converter_verbose,
        )
    }

    fn build_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args_template
            .iter()
            .map(|arg| {
                OsString::from(
                    arg.replace(INPUT_PLACEHOLDER, &input)
                        .replace(OUTPUT_PLACEHOLDER, &output),
                )
            })
            .collect()
    }

    fn log_line(&self, stream: &'static str, line: &str) {
        if self.verbose {
            tracing::info!(converter = %self.program, stream, "{}", line);
        } else {
            tracing::debug!(converter = %self.program, stream, "{}", line);
        }
    }
}

/// Feed every line of `reader` to `on_line`, decoding lossily.
async fn for_each_line<R, F>(reader: R, mut on_line: F) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf);
        on_line(line.trim_end_matches(['\r', '\n']));
    }
}

#[async_trait]
impl Converter for CommandConverter {
    fn name(&self) -> &str {
        &self.program
    }

    async fn probe(&self, timeout: Duration) -> Result<String, ConverterError> {
        let child = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConverterError::Launch {
                program: self.program.clone(),
                source,
            })?;

        // Dropping the timed-out future drops the child, which kills it.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| ConverterError::ProbeTimeout(timeout))??;

        if !output.status.success() {
            return Err(ConverterError::ProbeFailed(format!(
                "{} --version exited with {:?}",
                self.program,
                output.status.code()
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        Ok(version)
    }

    #[tracing::instrument(skip(self, progress), fields(converter = %self.program))]
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        progress: ProgressSender,
    ) -> Result<(), ConverterError> {
        let start = Instant::now();
        let mut child = Command::new(&self.program)
            .args(self.build_args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConverterError::Launch {
                program: self.program.clone(),
                source,
            })?;

        let stderr_task = child.stderr.take().map(|stderr| {
            let this = self.clone();
            tokio::spawn(async move {
                let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
                let _ = for_each_line(stderr, |line| {
                    this.log_line("stderr", line);
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line.to_string());
                })
                .await;
                tail.into_iter().collect::<Vec<_>>().join("\n")
            })
        });

        if let Some(stdout) = child.stdout.take() {
            for_each_line(stdout, |line| {
                self.log_line("stdout", line);
                if let Some(percent) = self.parser.parse(line) {
                    // The receiver going away only means nobody tracks progress anymore.
                    let _ = progress.send(percent);
                }
            })
            .await?;
        }

        let status = child.wait().await?;
        let stderr_tail = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        tracing::info!(
            exit_code = ?status.code(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Converter finished"
        );

        if status.success() {
            Ok(())
        } else {
            if !stderr_tail.is_empty() {
                tracing::warn!(exit_code = ?status.code(), stderr = %stderr_tail, "Converter failed");
            }
            Err(ConverterError::Exit {
                code: status.code(),
                stderr_tail,
            })
        }
    }
}
