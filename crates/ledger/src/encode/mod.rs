//! Encoder modules for the transcode batch

pub mod ffmpeg;

pub use ffmpeg::FfmpegEncoder;

use crate::plan::TranscodePlan;
use thiserror::Error;

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The operator interrupted the encode
    #[error("Encode interrupted by operator")]
    Interrupted,

    /// Encoder exited with non-zero status
    #[error("Encoder failed with exit code: {0}")]
    Failed(i32),

    /// Encoder was terminated by a signal
    #[error("Encoder process was terminated by signal")]
    Terminated,

    /// IO error during encoding
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs a composed [`TranscodePlan`] to completion.
#[allow(async_fn_in_trait)]
pub trait Encoder {
    async fn encode(&self, plan: &TranscodePlan) -> Result<(), EncodeError>;
}
