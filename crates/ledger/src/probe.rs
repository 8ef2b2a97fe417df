//! Stream probe interpreter.
//!
//! Runs ffprobe against a file and classifies its diagnostic output as
//! progressive or interlaced. Resolution is used as a stand-in for scan type:
//! one resolution signature means progressive, another means interlaced.

use media_ledger_config::ProbeConfig;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The prober could not be started or its output could not be read.
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Classification of a probed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Progressive,
    Interlaced,
    /// Both signatures were seen, or neither.
    Indeterminate,
}

impl std::fmt::Display for ProbeResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeResult::Progressive => write!(f, "progressive"),
            ProbeResult::Interlaced => write!(f, "interlaced"),
            ProbeResult::Indeterminate => write!(f, "indeterminate"),
        }
    }
}

/// Substrings that mark a probe line as progressive or interlaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSignatures {
    pub progressive: String,
    pub interlaced: String,
}

impl Default for ScanSignatures {
    fn default() -> Self {
        Self {
            progressive: "1280x720".to_string(),
            interlaced: "1920x1080".to_string(),
        }
    }
}

impl From<&ProbeConfig> for ScanSignatures {
    fn from(cfg: &ProbeConfig) -> Self {
        Self {
            progressive: cfg.progressive_signature.clone(),
            interlaced: cfg.interlaced_signature.clone(),
        }
    }
}

/// Classifies probe output lines.
///
/// The first line carrying a signature decides the candidate. If the other
/// signature shows up anywhere in the output, or no signature is found at
/// all, the result is [`ProbeResult::Indeterminate`].
pub fn classify<I, S>(lines: I, signatures: &ScanSignatures) -> ProbeResult
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen_progressive = false;
    let mut seen_interlaced = false;

    for line in lines {
        let line = line.as_ref();
        seen_progressive |= line.contains(signatures.progressive.as_str());
        seen_interlaced |= line.contains(signatures.interlaced.as_str());
        if seen_progressive && seen_interlaced {
            return ProbeResult::Indeterminate;
        }
    }

    match (seen_progressive, seen_interlaced) {
        (true, false) => ProbeResult::Progressive,
        (false, true) => ProbeResult::Interlaced,
        _ => ProbeResult::Indeterminate,
    }
}

/// Source of stream diagnostics for a media file.
#[allow(async_fn_in_trait)]
pub trait StreamProber {
    /// Returns the prober's diagnostic output for `path`, one entry per line.
    async fn probe_lines(&self, path: &Path) -> Result<Vec<String>, ProbeError>;
}

/// [`StreamProber`] that shells out to ffprobe and reads its stderr.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    program: String,
}

impl FfprobeProber {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn from_config(cfg: &ProbeConfig) -> Self {
        Self::new(cfg.program.clone())
    }

    fn spawn_error(&self, source: std::io::Error) -> ProbeError {
        ProbeError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl StreamProber for FfprobeProber {
    async fn probe_lines(&self, path: &Path) -> Result<Vec<String>, ProbeError> {
        let mut child = Command::new(&self.program)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let mut lines = Vec::new();
        if let Some(stderr) = child.stderr.take() {
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                let read = reader
                    .read_until(b'\n', &mut buf)
                    .await
                    .map_err(|e| self.spawn_error(e))?;
                if read == 0 {
                    break;
                }
                // Container metadata is not always valid UTF-8
                lines.push(String::from_utf8_lossy(&buf).trim_end().to_string());
            }
        }

        let status = child.wait().await.map_err(|e| self.spawn_error(e))?;
        if !status.success() {
            tracing::debug!(
                program = %self.program,
                path = %path.display(),
                %status,
                "prober exited unsuccessfully"
            );
        }

        Ok(lines)
    }
}
