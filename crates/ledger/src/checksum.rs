//! Checksum listing loader.
//!
//! Reads md5sum-style listings (`<digest>  <path>`, one per line) into a
//! lookup table keyed by the path as written in the listing.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading a checksum listing.
#[derive(Debug, Error)]
pub enum ChecksumError {
    /// A non-blank line did not carry both a digest and a path.
    #[error("Malformed checksum listing at line {line}: {content:?}")]
    Malformed { line: usize, content: String },

    /// IO error reading the listing.
    #[error("IO error reading checksum listing: {0}")]
    Io(#[from] std::io::Error),
}

/// Mapping from file path to checksum digest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumTable {
    digests: HashMap<String, String>,
}

impl ChecksumTable {
    /// Parses listing text. Later lines win when a path is listed twice.
    pub fn parse(text: &str) -> Result<Self, ChecksumError> {
        let mut digests = HashMap::new();

        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let trimmed = line.trim_start();
            let (digest, rest) = match trimmed.split_once(char::is_whitespace) {
                Some(parts) => parts,
                None => {
                    return Err(ChecksumError::Malformed {
                        line: idx + 1,
                        content: line.to_string(),
                    })
                }
            };

            // md5sum prefixes the path with '*' in binary mode
            let path = rest.trim_start();
            let path = path.strip_prefix('*').unwrap_or(path);
            if path.is_empty() {
                return Err(ChecksumError::Malformed {
                    line: idx + 1,
                    content: line.to_string(),
                });
            }

            digests.insert(path.to_string(), digest.to_string());
        }

        Ok(Self { digests })
    }

    /// Reads and parses a listing file in full.
    pub fn load(path: &Path) -> Result<Self, ChecksumError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Digest recorded for `path`, if any.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.digests.get(path).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

impl FromIterator<(String, String)> for ChecksumTable {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            digests: iter.into_iter().collect(),
        }
    }
}
