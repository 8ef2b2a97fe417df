//! Canned prober and encoder for tests.

use crate::encode::{EncodeError, Encoder};
use crate::plan::TranscodePlan;
use crate::probe::{ProbeError, StreamProber};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub(crate) const PROGRESSIVE_LINE: &str =
    "    Stream #0:0: Video: h264 (High), yuv420p(progressive), 1280x720, 59.94 fps";
pub(crate) const INTERLACED_LINE: &str =
    "    Stream #0:0: Video: mpeg2video (Main), yuv420p(top first), 1920x1080, 29.97 fps";

/// Returns the same lines for every file unless a path has its own.
#[derive(Debug, Default)]
pub(crate) struct FakeProber {
    default_lines: Vec<String>,
    per_path: HashMap<PathBuf, Vec<String>>,
    calls: Mutex<Vec<PathBuf>>,
}

impl FakeProber {
    pub(crate) fn always(lines: &[&str]) -> Self {
        Self {
            default_lines: lines.iter().map(|l| l.to_string()).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn with_path(mut self, path: impl Into<PathBuf>, lines: &[&str]) -> Self {
        self.per_path
            .insert(path.into(), lines.iter().map(|l| l.to_string()).collect());
        self
    }

    pub(crate) fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

impl StreamProber for FakeProber {
    async fn probe_lines(&self, path: &Path) -> Result<Vec<String>, ProbeError> {
        self.calls.lock().unwrap().push(path.to_path_buf());
        Ok(self
            .per_path
            .get(path)
            .unwrap_or(&self.default_lines)
            .clone())
    }
}

/// Scripted result of one fake encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FakeOutcome {
    Success,
    /// Writes a partial output file, then reports an interrupt.
    Interrupted,
    /// Writes a partial output file, then exits with the given code.
    Failed(i32),
}

/// Plays back scripted outcomes; succeeds once the script runs out.
#[derive(Debug, Default)]
pub(crate) struct FakeEncoder {
    script: Mutex<VecDeque<FakeOutcome>>,
    encoded: Mutex<Vec<TranscodePlan>>,
}

impl FakeEncoder {
    pub(crate) fn scripted(outcomes: &[FakeOutcome]) -> Self {
        Self {
            script: Mutex::new(outcomes.iter().copied().collect()),
            encoded: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn encoded(&self) -> Vec<TranscodePlan> {
        self.encoded.lock().unwrap().clone()
    }
}

impl Encoder for FakeEncoder {
    async fn encode(&self, plan: &TranscodePlan) -> Result<(), EncodeError> {
        self.encoded.lock().unwrap().push(plan.clone());
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(FakeOutcome::Success);

        std::fs::write(&plan.output_path, b"partial")?;
        match outcome {
            FakeOutcome::Success => Ok(()),
            FakeOutcome::Interrupted => Err(EncodeError::Interrupted),
            FakeOutcome::Failed(code) => Err(EncodeError::Failed(code)),
        }
    }
}
