//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Manifest reconciliation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconcileConfig {
    /// Fail when the directory holds files no manifest entry references
    #[serde(default = "default_strict")]
    pub strict: bool,
    /// Target extension for a format migration pass (e.g. "mkv")
    #[serde(default)]
    pub rewrite_extension: Option<String>,
    /// Suffix inserted before the extension of the reconciled manifest
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,
}

fn default_strict() -> bool {
    true
}

fn default_output_suffix() -> String {
    "-NEW".to_string()
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            strict: default_strict(),
            rewrite_extension: None,
            output_suffix: default_output_suffix(),
        }
    }
}

/// What the transcode batch does when a probe cannot tell the scan type apart
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguousScanPolicy {
    /// Stop the whole batch
    #[default]
    AbortBatch,
    /// Warn, leave the file unencoded and continue with the next entry
    SkipFile,
}

/// Transcode plan settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscodeConfig {
    /// Directory encoded files are written to, relative to the manifest directory
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// Extension of encoded files
    #[serde(default = "default_target_extension")]
    pub target_extension: String,
    /// Length truncated files are capped at
    #[serde(default = "default_truncate_to_minutes")]
    pub truncate_to_minutes: u32,
    /// Minute marks (with zero hours) that make a file eligible for truncation
    #[serde(default = "default_eligible_minutes")]
    pub eligible_minutes: Vec<u32>,
    /// Crop aspect numerator
    #[serde(default = "default_crop_aspect_width")]
    pub crop_aspect_width: u32,
    /// Crop aspect denominator
    #[serde(default = "default_crop_aspect_height")]
    pub crop_aspect_height: u32,
    #[serde(default)]
    pub ambiguous_scan: AmbiguousScanPolicy,
    /// Manifest file name looked up in the working directory
    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,
}

fn default_output_dir() -> String {
    "output HEVC".to_string()
}

fn default_target_extension() -> String {
    "mkv".to_string()
}

fn default_truncate_to_minutes() -> u32 {
    32
}

fn default_eligible_minutes() -> Vec<u32> {
    vec![39, 40, 41]
}

fn default_crop_aspect_width() -> u32 {
    4
}

fn default_crop_aspect_height() -> u32 {
    3
}

fn default_manifest_name() -> String {
    "METADATA.xml".to_string()
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            target_extension: default_target_extension(),
            truncate_to_minutes: default_truncate_to_minutes(),
            eligible_minutes: default_eligible_minutes(),
            crop_aspect_width: default_crop_aspect_width(),
            crop_aspect_height: default_crop_aspect_height(),
            ambiguous_scan: AmbiguousScanPolicy::default(),
            manifest_name: default_manifest_name(),
        }
    }
}

/// External encoder settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderConfig {
    #[serde(default = "default_encoder_program")]
    pub program: String,
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default = "default_rate_control")]
    pub rate_control: String,
    /// Pixel format forced for animated sources
    #[serde(default = "default_pixel_format")]
    pub pixel_format: String,
    #[serde(default = "default_deinterlace_filter")]
    pub deinterlace_filter: String,
}

fn default_encoder_program() -> String {
    "ffmpeg".to_string()
}

fn default_video_codec() -> String {
    "hevc_nvenc".to_string()
}

fn default_profile() -> String {
    "main10".to_string()
}

fn default_preset() -> String {
    "slow".to_string()
}

fn default_rate_control() -> String {
    "vbr".to_string()
}

fn default_pixel_format() -> String {
    "p010le".to_string()
}

fn default_deinterlace_filter() -> String {
    "yadif=1".to_string()
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: default_encoder_program(),
            video_codec: default_video_codec(),
            profile: default_profile(),
            preset: default_preset(),
            rate_control: default_rate_control(),
            pixel_format: default_pixel_format(),
            deinterlace_filter: default_deinterlace_filter(),
        }
    }
}

/// External stream prober settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_program")]
    pub program: String,
    /// Resolution string taken to mean progressive content
    #[serde(default = "default_progressive_signature")]
    pub progressive_signature: String,
    /// Resolution string taken to mean interlaced content
    #[serde(default = "default_interlaced_signature")]
    pub interlaced_signature: String,
}

fn default_probe_program() -> String {
    "ffprobe".to_string()
}

fn default_progressive_signature() -> String {
    "1280x720".to_string()
}

fn default_interlaced_signature() -> String {
    "1920x1080".to_string()
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            program: default_probe_program(),
            progressive_signature: default_progressive_signature(),
            interlaced_signature: default_interlaced_signature(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub reconcile: ReconcileConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - MEDIA_LEDGER_STRICT -> reconcile.strict
    /// - MEDIA_LEDGER_OUTPUT_DIR -> transcode.output_dir
    /// - MEDIA_LEDGER_TRUNCATE_TO_MINUTES -> transcode.truncate_to_minutes
    /// - MEDIA_LEDGER_ENCODER -> encoder.program
    /// - MEDIA_LEDGER_PROBER -> probe.program
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("MEDIA_LEDGER_STRICT") {
            // Accept "true", "1", "yes" as true; "false", "0", "no" as false
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" => self.reconcile.strict = true,
                "false" | "0" | "no" => self.reconcile.strict = false,
                _ => {} // Invalid value, keep existing
            }
        }

        if let Ok(val) = env::var("MEDIA_LEDGER_OUTPUT_DIR") {
            if !val.is_empty() {
                self.transcode.output_dir = val;
            }
        }

        if let Ok(val) = env::var("MEDIA_LEDGER_TRUNCATE_TO_MINUTES") {
            if let Ok(minutes) = val.parse::<u32>() {
                self.transcode.truncate_to_minutes = minutes;
            }
        }

        if let Ok(val) = env::var("MEDIA_LEDGER_ENCODER") {
            if !val.is_empty() {
                self.encoder.program = val;
            }
        }

        if let Ok(val) = env::var("MEDIA_LEDGER_PROBER") {
            if !val.is_empty() {
                self.probe.program = val;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Built-in defaults with environment overrides, for runs without a config file
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }
}
