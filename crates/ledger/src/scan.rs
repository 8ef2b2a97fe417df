//! Scanner module for building the set of files a manifest is reconciled against.
//!
//! The scan walks a root directory recursively and records every regular file.
//! Matching consumes files one at a time, so the set only ever shrinks.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Error type for directory scans.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The scan root does not exist or is not a directory.
    #[error("Scan root is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Walking the directory tree failed.
    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Files discovered under a scan root, in walk order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    files: Vec<PathBuf>,
}

impl FileSet {
    pub fn new(files: Vec<PathBuf>) -> Self {
        Self { files }
    }

    /// Removes and returns the first file whose trailing path components equal `suffix`.
    ///
    /// Only one file is consumed per call, so two manifest entries with the same
    /// relative path in different subdirectories each claim their own file.
    pub fn take_match(&mut self, suffix: &Path) -> Option<PathBuf> {
        let idx = self.files.iter().position(|f| f.ends_with(suffix))?;
        Some(self.files.remove(idx))
    }

    /// Removes `exact` if present, otherwise the first file ending with `suffix`.
    ///
    /// An entry whose own file exists never claims a same-named file from a
    /// sibling directory that happens to sort earlier.
    pub fn take_exact_or_match(&mut self, exact: &Path, suffix: &Path) -> Option<PathBuf> {
        match self.files.iter().position(|f| f == exact) {
            Some(idx) => Some(self.files.remove(idx)),
            None => self.take_match(suffix),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.iter()
    }

    pub fn into_remaining(self) -> Vec<PathBuf> {
        self.files
    }
}

/// Recursively lists every regular file under `root`.
///
/// Entries are sorted by file name within each directory so the walk order,
/// and therefore which duplicate is matched first, is deterministic.
pub fn scan_directory(root: &Path) -> Result<FileSet, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    Ok(FileSet::new(files))
}
