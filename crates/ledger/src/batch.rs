//! Transcode batch driver.
//!
//! Walks manifest entries in document order, builds a plan for each, and runs
//! the encoder one file at a time. Any encode failure ends the batch. An
//! interrupt also removes the partial output of the file being encoded.

use crate::encode::{EncodeError, Encoder};
use crate::interrupt::InterruptSignal;
use crate::manifest::Manifest;
use crate::plan::{PlanBuilder, PlanError, PlanOptions, TranscodePlan};
use crate::probe::StreamProber;
use media_ledger_config::{AmbiguousScanPolicy, Config};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error type for batch execution
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Failed to create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Plan building failed; includes ambiguous scan types under `abort_batch`
    #[error("Failed to plan {path}: {source}")]
    Plan {
        path: String,
        #[source]
        source: PlanError,
    },

    /// The operator interrupted an encode; its partial output was removed
    #[error("Encode of {} interrupted; partial output removed", output.display())]
    EncodeInterrupted { output: PathBuf },

    /// The encoder failed; partial output is left in place
    #[error("Encode of {} failed: {source}", input.display())]
    EncodeFailed {
        input: PathBuf,
        output: PathBuf,
        #[source]
        source: EncodeError,
    },

    /// The operator interrupted between files
    #[error("Batch interrupted before {path}")]
    Interrupted { path: String },
}

/// Options for one batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    pub plan: PlanOptions,
    /// Build and log plans without running the encoder
    pub dry_run: bool,
}

/// An entry left unencoded under the `skip_file` policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub path: String,
    pub reason: String,
}

/// Outcome of a completed batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Output files written, in manifest order
    pub encoded: Vec<PathBuf>,
    pub skipped: Vec<SkippedEntry>,
    /// Plans built but not executed (dry runs only)
    pub planned: Vec<TranscodePlan>,
}

/// Sequential transcode pipeline over a manifest
pub struct TranscodeBatch<P, E> {
    builder: PlanBuilder<P>,
    encoder: E,
    ambiguous_scan: AmbiguousScanPolicy,
    interrupt: InterruptSignal,
}

impl<P: StreamProber, E: Encoder> TranscodeBatch<P, E> {
    pub fn new(config: &Config, prober: P, encoder: E, interrupt: InterruptSignal) -> Self {
        Self {
            builder: PlanBuilder::new(config, prober),
            encoder,
            ambiguous_scan: config.transcode.ambiguous_scan,
            interrupt,
        }
    }

    /// Run every entry of `manifest`, whose paths are relative to `source_root`
    ///
    /// # Returns
    /// * `Ok(BatchSummary)` - Every entry was encoded, skipped, or planned
    /// * `Err(BatchError)` - The batch stopped; later entries were not started
    pub async fn run(
        &self,
        manifest: &Manifest,
        source_root: &Path,
        options: BatchOptions,
    ) -> Result<BatchSummary, BatchError> {
        let mut summary = BatchSummary::default();

        if !options.dry_run {
            let output_dir = self.builder.output_dir(source_root);
            std::fs::create_dir_all(&output_dir).map_err(|source| BatchError::OutputDir {
                path: output_dir.clone(),
                source,
            })?;
        }

        for entry in manifest.entries() {
            if self.interrupt.is_raised() {
                return Err(BatchError::Interrupted {
                    path: entry.path().to_string(),
                });
            }

            let plan = match self.builder.build(entry, source_root, options.plan).await {
                Ok(plan) => plan,
                Err(PlanError::AmbiguousScanType { path })
                    if self.ambiguous_scan == AmbiguousScanPolicy::SkipFile =>
                {
                    warn!(path = %path.display(), "skipping file with ambiguous scan type");
                    summary.skipped.push(SkippedEntry {
                        path: entry.path().to_string(),
                        reason: "ambiguous scan type".to_string(),
                    });
                    continue;
                }
                Err(source) => {
                    return Err(BatchError::Plan {
                        path: entry.path().to_string(),
                        source,
                    })
                }
            };

            info!(command = %plan.command_line(), "encoding {}", entry.path());

            if options.dry_run {
                summary.planned.push(plan);
                continue;
            }

            match self.encoder.encode(&plan).await {
                Ok(()) => {
                    debug!(output = %plan.output_path.display(), "encode complete");
                    summary.encoded.push(plan.output_path);
                }
                Err(EncodeError::Interrupted) => {
                    remove_partial_output(&plan.output_path);
                    return Err(BatchError::EncodeInterrupted {
                        output: plan.output_path,
                    });
                }
                Err(source) => {
                    return Err(BatchError::EncodeFailed {
                        input: plan.input_path,
                        output: plan.output_path,
                        source,
                    });
                }
            }
        }

        Ok(summary)
    }
}

fn remove_partial_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => warn!(path = %path.display(), "removed incomplete output"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "failed to remove incomplete output: {}", e),
    }
}
