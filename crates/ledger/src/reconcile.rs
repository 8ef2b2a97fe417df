//! Manifest reconciliation.
//!
//! Matches every manifest entry to exactly one file under a scan root,
//! refreshes its `SIZE` (and `MD5` when a checksum listing is supplied), and
//! optionally migrates its path to a new container extension. Any failure
//! aborts the whole run; the reconciled document is only written when every
//! entry succeeded.

use crate::checksum::{ChecksumError, ChecksumTable};
use crate::manifest::{derived_output_path, Manifest, ManifestError};
use crate::scan::{scan_directory, FileSet, ScanError};
use media_ledger_config::ReconcileConfig;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Extensions the rewrite rule can replace, in characters.
const REWRITE_EXTENSION_LEN: usize = 3;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Manifest entry has no matching file under the scan root: {path}")]
    UnmatchedManifestEntry { path: String },

    #[error("Matched file could not be read at {}: {source}", path.display())]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} file(s) not referenced by the manifest: {}", files.len(), display_paths(files))]
    UnreconciledFiles { files: Vec<PathBuf> },

    #[error("Checksum listing has no entry for {path}")]
    MissingChecksum { path: String },

    #[error("Cannot rewrite extension of {path} to {extension:?}: only 3-character extensions are supported")]
    UnsupportedExtensionLength { path: String, extension: String },

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Checksum listing error: {0}")]
    Checksum(#[from] ChecksumError),
}

fn display_paths(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// How leftover directory files are treated once every entry is matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Leftover files fail the run with `UnreconciledFiles`.
    #[default]
    Strict,
    /// Leftover files are logged and reported.
    Lenient,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub mode: ReconcileMode,
    /// Target extension (without the dot) every entry path is migrated to.
    pub extension_rewrite: Option<String>,
}

impl ReconcileOptions {
    pub fn from_config(cfg: &ReconcileConfig) -> Self {
        Self {
            mode: if cfg.strict {
                ReconcileMode::Strict
            } else {
                ReconcileMode::Lenient
            },
            extension_rewrite: cfg.rewrite_extension.clone(),
        }
    }
}

/// Summary of a successful reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub entries: usize,
    /// Entries whose path changed under the extension rewrite.
    pub rewritten: usize,
    /// Files under the scan root no entry claimed (lenient mode only).
    pub extra_files: Vec<PathBuf>,
}

/// Reconciled manifest plus its report.
#[derive(Debug)]
pub struct Reconciled {
    pub manifest: Manifest,
    pub report: ReconcileReport,
}

/// Replaces the 3-character extension of `path` with `extension`.
///
/// Returns the path unchanged when it already carries the target extension.
pub fn rewrite_extension(path: &str, extension: &str) -> Result<String, ReconcileError> {
    let extension = extension.trim_start_matches('.');
    let unsupported = || ReconcileError::UnsupportedExtensionLength {
        path: path.to_string(),
        extension: extension.to_string(),
    };

    if extension.chars().count() != REWRITE_EXTENSION_LEN {
        return Err(unsupported());
    }

    let (stem, current) = path.rsplit_once('.').ok_or_else(unsupported)?;
    if current.chars().count() != REWRITE_EXTENSION_LEN || current.contains('/') {
        return Err(unsupported());
    }

    Ok(format!("{}.{}", stem, extension))
}

/// Reconciles `manifest` against `files`, the scan of `root`.
///
/// Entries are processed in document order. For each, the path is rewritten
/// (if configured), one matching file is consumed from `files`, `SIZE` is set
/// from `root/<path>`, and `MD5` is set from `checksums` (if supplied).
pub fn reconcile(
    mut manifest: Manifest,
    root: &Path,
    mut files: FileSet,
    checksums: Option<&ChecksumTable>,
    options: &ReconcileOptions,
) -> Result<Reconciled, ReconcileError> {
    let mut report = ReconcileReport {
        entries: manifest.len(),
        ..ReconcileReport::default()
    };

    for entry in manifest.entries_mut() {
        if let Some(extension) = &options.extension_rewrite {
            let new_path = rewrite_extension(entry.path(), extension)?;
            if new_path != entry.path() {
                info!(from = %entry.path(), to = %new_path, "rewriting manifest path");
                entry.set_path(new_path);
                report.rewritten += 1;
            }
        }

        let path = entry.path().to_string();

        let on_disk = root.join(&path);
        let matched = files
            .take_exact_or_match(&on_disk, Path::new(&path))
            .ok_or_else(|| ReconcileError::UnmatchedManifestEntry { path: path.clone() })?;

        let size = fs::metadata(&on_disk)
            .map_err(|source| ReconcileError::FileNotFound {
                path: on_disk.clone(),
                source,
            })?
            .len();
        entry.set_size_bytes(size);

        if let Some(table) = checksums {
            let digest = table
                .get(&path)
                .ok_or_else(|| ReconcileError::MissingChecksum { path: path.clone() })?;
            entry.set_checksum(digest);
        }

        debug!(entry = %path, file = %matched.display(), size, "matched manifest entry");
    }

    let extra: Vec<PathBuf> = files
        .into_remaining()
        .into_iter()
        .map(|f| f.strip_prefix(root).map(Path::to_path_buf).unwrap_or(f))
        .collect();

    if !extra.is_empty() {
        match options.mode {
            ReconcileMode::Strict => return Err(ReconcileError::UnreconciledFiles { files: extra }),
            ReconcileMode::Lenient => {
                for file in &extra {
                    warn!(file = %file.display(), "file not referenced by manifest");
                }
            }
        }
    }
    report.extra_files = extra;

    Ok(Reconciled { manifest, report })
}

/// Result of [`run_reconciliation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    /// Where the reconciled manifest was written.
    pub output_path: PathBuf,
    #[serde(flatten)]
    pub report: ReconcileReport,
}

impl ReconcileOutcome {
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Loads, reconciles, and writes `<manifest stem><output_suffix>.<ext>`.
///
/// The source manifest is never modified. Nothing is written on failure.
pub fn run_reconciliation(
    manifest_path: &Path,
    root: &Path,
    checksum_path: Option<&Path>,
    options: &ReconcileOptions,
    output_suffix: &str,
) -> Result<ReconcileOutcome, ReconcileError> {
    let checksums = checksum_path.map(ChecksumTable::load).transpose()?;
    if let Some(table) = &checksums {
        debug!(entries = table.len(), "loaded checksum listing");
    }

    let manifest = Manifest::load(manifest_path)?;
    let files = scan_directory(root)?;
    info!(
        manifest = %manifest_path.display(),
        entries = manifest.len(),
        files = files.len(),
        "reconciling"
    );

    let Reconciled { manifest, report } =
        reconcile(manifest, root, files, checksums.as_ref(), options)?;

    let output_path = derived_output_path(manifest_path, output_suffix);
    manifest.write_to(&output_path)?;
    info!(output = %output_path.display(), "wrote reconciled manifest");

    Ok(ReconcileOutcome {
        output_path,
        report,
    })
}
