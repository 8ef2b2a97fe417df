//! Startup checks module
//!
//! Preflight checks run before a transcode batch:
//! - The configured encoder runs (`<encoder> -version`)
//! - The configured prober runs (`<prober> -version`)

use crate::config::Config;
use std::process::Command;
use thiserror::Error;
use tracing::info;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{program} not available: {reason}")]
    ToolUnavailable { program: String, reason: String },
}

/// Extract the version token from `-version` output
///
/// Handles the FFmpeg family banner format:
/// - Release: "ffmpeg version 6.1.1 Copyright ..."
/// - Git build: "ffprobe version n6.1-12-gabcdef Copyright ..."
pub fn parse_tool_version(version_output: &str) -> Option<String> {
    version_output.lines().find_map(|line| {
        let mut words = line.split_whitespace();
        while let Some(word) = words.next() {
            if word.eq_ignore_ascii_case("version") {
                return words.next().map(str::to_string);
            }
        }
        None
    })
}

/// Check that `program -version` runs and exits successfully
///
/// Returns the reported version, or `"unknown"` when the banner has none.
pub fn check_tool_available(program: &str) -> Result<String, StartupError> {
    let output = Command::new(program)
        .arg("-version")
        .output()
        .map_err(|e| StartupError::ToolUnavailable {
            program: program.to_string(),
            reason: format!("failed to run {} -version; is it installed and in PATH? Error: {}", program, e),
        })?;

    if !output.status.success() {
        return Err(StartupError::ToolUnavailable {
            program: program.to_string(),
            reason: format!("{} -version exited with {}", program, output.status),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(parse_tool_version(&stdout).unwrap_or_else(|| "unknown".to_string()))
}

/// Run all startup checks in order
///
/// Checks are run in the following order:
/// 1. Encoder availability
/// 2. Prober availability
pub fn run_startup_checks(cfg: &Config) -> Result<(), StartupError> {
    for program in [&cfg.encoder.program, &cfg.probe.program] {
        let version = check_tool_available(program)?;
        info!(program = %program, version = %version, "tool available");
    }
    Ok(())
}
