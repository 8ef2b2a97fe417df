//! FFmpeg encoder module
//!
//! Runs a composed transcode plan as a child process, racing it against the
//! operator interrupt signal.

use super::{EncodeError, Encoder};
use crate::interrupt::InterruptSignal;
use crate::plan::TranscodePlan;
use std::process::ExitStatus;
use tokio::process::Command;

/// [`Encoder`] that spawns the plan's program with its argument list
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    interrupt: InterruptSignal,
}

impl FfmpegEncoder {
    pub fn new(interrupt: InterruptSignal) -> Self {
        Self { interrupt }
    }
}

/// Map a finished process status onto the encode result
///
/// # Returns
/// * `Ok(())` - The encoder exited normally with status zero
/// * `Err(EncodeError::Failed)` - The encoder exited with a non-zero code
/// * `Err(EncodeError::Terminated)` - The encoder was killed by a signal
pub fn status_to_result(status: ExitStatus) -> Result<(), EncodeError> {
    if status.success() {
        Ok(())
    } else {
        match status.code() {
            Some(code) => Err(EncodeError::Failed(code)),
            None => Err(EncodeError::Terminated),
        }
    }
}

impl FfmpegEncoder {
    // Ctrl-C reaches the whole process group, so the encoder can exit on the
    // signal before the interrupt task has raised the watch.
    fn settle(&self, status: ExitStatus) -> Result<(), EncodeError> {
        match status_to_result(status) {
            Err(_) if self.interrupt.is_raised() => Err(EncodeError::Interrupted),
            result => result,
        }
    }
}

impl Encoder for FfmpegEncoder {
    /// Execute the plan and wait for the encoder to finish
    ///
    /// If the interrupt signal is raised first, the child is killed and
    /// `EncodeError::Interrupted` is returned. Output files are left alone;
    /// cleanup is the caller's decision.
    async fn encode(&self, plan: &TranscodePlan) -> Result<(), EncodeError> {
        if self.interrupt.is_raised() {
            return Err(EncodeError::Interrupted);
        }

        let mut child = Command::from(plan.command()).kill_on_drop(true).spawn()?;

        let status = tokio::select! {
            biased;
            _ = self.interrupt.raised() => None,
            status = child.wait() => Some(status?),
        };

        match status {
            Some(status) => self.settle(status),
            None => {
                if let Err(e) = child.kill().await {
                    tracing::warn!("failed to stop encoder after interrupt: {}", e);
                }
                Err(EncodeError::Interrupted)
            }
        }
    }
}
