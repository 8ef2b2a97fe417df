//! Media Ledger
//!
//! Reconciles XML media manifests against the files on disk, and drives a
//! per-file transcode batch whose encoder arguments depend on recorded
//! duration, probed scan type, and operator-selected modes.

pub mod batch;
pub mod checksum;
pub mod duration;
pub mod encode;
pub mod interrupt;
pub mod manifest;
pub mod plan;
pub mod probe;
pub mod reconcile;
pub mod scan;
pub mod startup;

#[cfg(test)]
mod fakes;

pub use media_ledger_config as config;
pub use media_ledger_config::Config;
pub use batch::{BatchError, BatchOptions, BatchSummary, SkippedEntry, TranscodeBatch};
pub use checksum::{ChecksumError, ChecksumTable};
pub use duration::{DurationError, Timestamp, TruncationPolicy};
pub use encode::{EncodeError, Encoder, FfmpegEncoder};
pub use interrupt::{interrupt_channel, listen_for_ctrl_c, InterruptHandle, InterruptSignal};
pub use manifest::{derived_output_path, Manifest, ManifestEntry, ManifestError};
pub use plan::{ClauseKind, PlanBuilder, PlanError, PlanOptions, TranscodePlan};
pub use probe::{classify, FfprobeProber, ProbeError, ProbeResult, ScanSignatures, StreamProber};
pub use reconcile::{
    reconcile, run_reconciliation, ReconcileError, ReconcileMode, ReconcileOptions,
    ReconcileOutcome, ReconcileReport, Reconciled,
};
pub use scan::{scan_directory, FileSet, ScanError};
pub use startup::{check_tool_available, run_startup_checks, StartupError};
