//! Transcode plan builder.
//!
//! Composes the encoder argument list for one manifest entry. The fixed base
//! arguments are split around an insertion point right after the input; the
//! optional clauses go there in a fixed precedence:
//!
//! ```text
//! ffmpeg -n -i <input> [deinterlace] [animation] [truncation] [crop] -c:v ... <output>
//! ```

use crate::duration::{DurationError, Timestamp, TruncationPolicy};
use crate::manifest::ManifestEntry;
use crate::probe::{classify, ProbeError, ProbeResult, ScanSignatures, StreamProber};
use media_ledger_config::{Config, EncoderConfig};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum PlanError {
    /// The entry's `DURATION_READABLE` could not be parsed.
    #[error("Invalid duration for {path}: {source}")]
    Duration {
        path: String,
        #[source]
        source: DurationError,
    },

    /// The probe saw both scan-type signatures, or neither.
    #[error("Ambiguous scan type for {}: probe output matched no single resolution signature", path.display())]
    AmbiguousScanType { path: PathBuf },

    /// The entry path has no file name to derive an output name from.
    #[error("Manifest path has no file name: {0:?}")]
    InvalidEntryPath(String),

    #[error("Probe failed: {0}")]
    Probe(#[from] ProbeError),
}

/// Per-batch switches chosen by the operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanOptions {
    /// Force the pixel format and map every video and audio stream explicitly.
    pub animated: bool,
    /// Crop to the configured aspect derived from input height.
    ///
    /// The crop is emitted as a second video filter after the deinterlace
    /// filter, and ffmpeg keeps only the last one, so cropping an interlaced
    /// input drops the deinterlace.
    pub crop: bool,
}

/// Optional argument groups, declared in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClauseKind {
    Deinterlace,
    Animation,
    Truncation,
    Crop,
}

/// A contiguous group of encoder arguments for one optional behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub kind: ClauseKind,
    pub args: Vec<String>,
}

impl Clause {
    fn new(kind: ClauseKind, args: &[&str]) -> Self {
        Self {
            kind,
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// A fully composed encoder invocation for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodePlan {
    pub program: String,
    pub args: Vec<OsString>,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Clauses included, in emission order.
    pub clauses: Vec<ClauseKind>,
}

impl TranscodePlan {
    pub fn has_clause(&self, kind: ClauseKind) -> bool {
        self.clauses.contains(&kind)
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Space-joined command line for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().map(|a| a.to_string_lossy().into_owned()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Assembles the argument list from base settings and the applicable clauses.
///
/// Clauses are emitted in [`ClauseKind`] order whatever order they are passed in.
pub fn assemble_args(
    encoder: &EncoderConfig,
    input: &Path,
    output: &Path,
    clauses: &[Clause],
) -> Vec<OsString> {
    let mut ordered: Vec<&Clause> = clauses.iter().collect();
    ordered.sort_by_key(|c| c.kind);

    let mut args: Vec<OsString> = vec!["-n".into(), "-i".into(), input.into()];
    for clause in ordered {
        args.extend(clause.args.iter().map(OsString::from));
    }
    for tail in [
        "-c:v",
        encoder.video_codec.as_str(),
        "-profile:v",
        encoder.profile.as_str(),
        "-preset",
        encoder.preset.as_str(),
        "-rc",
        encoder.rate_control.as_str(),
        "-c:a",
        "copy",
        "-sn",
    ] {
        args.push(tail.into());
    }
    args.push(output.into());
    args
}

/// Builds [`TranscodePlan`]s for manifest entries.
#[derive(Debug, Clone)]
pub struct PlanBuilder<P> {
    encoder: EncoderConfig,
    truncation: TruncationPolicy,
    signatures: ScanSignatures,
    output_dir: PathBuf,
    target_extension: String,
    crop_aspect: (u32, u32),
    prober: P,
}

impl<P: StreamProber> PlanBuilder<P> {
    pub fn new(config: &Config, prober: P) -> Self {
        let transcode = &config.transcode;
        Self {
            encoder: config.encoder.clone(),
            truncation: TruncationPolicy::new(
                transcode.eligible_minutes.iter().copied(),
                transcode.truncate_to_minutes,
            ),
            signatures: ScanSignatures::from(&config.probe),
            output_dir: PathBuf::from(&transcode.output_dir),
            target_extension: transcode.target_extension.trim_start_matches('.').to_string(),
            crop_aspect: (transcode.crop_aspect_width, transcode.crop_aspect_height),
            prober,
        }
    }

    /// Output directory resolved against the manifest directory.
    pub fn output_dir(&self, source_root: &Path) -> PathBuf {
        source_root.join(&self.output_dir)
    }

    /// `<output dir>/<entry basename with target extension>`.
    pub fn output_path(&self, source_root: &Path, entry_path: &str) -> Result<PathBuf, PlanError> {
        let name = Path::new(entry_path)
            .file_name()
            .ok_or_else(|| PlanError::InvalidEntryPath(entry_path.to_string()))?;
        let renamed = Path::new(name).with_extension(&self.target_extension);
        Ok(self.output_dir(source_root).join(renamed))
    }

    /// Whether the entry's recorded duration qualifies for truncation.
    pub fn should_truncate(&self, entry: &ManifestEntry) -> Result<bool, PlanError> {
        let Some(text) = entry.duration_readable() else {
            return Ok(false);
        };
        let duration = Timestamp::parse(text).map_err(|source| PlanError::Duration {
            path: entry.path().to_string(),
            source,
        })?;
        Ok(self.truncation.should_truncate(&duration))
    }

    /// Probes the input and classifies its scan type.
    pub async fn scan_type(&self, input: &Path) -> Result<ProbeResult, PlanError> {
        let lines = self.prober.probe_lines(input).await?;
        match classify(&lines, &self.signatures) {
            ProbeResult::Indeterminate => Err(PlanError::AmbiguousScanType {
                path: input.to_path_buf(),
            }),
            result => Ok(result),
        }
    }

    /// Builds the plan for one entry whose path is relative to `source_root`.
    pub async fn build(
        &self,
        entry: &ManifestEntry,
        source_root: &Path,
        options: PlanOptions,
    ) -> Result<TranscodePlan, PlanError> {
        let input_path = source_root.join(entry.path());
        let output_path = self.output_path(source_root, entry.path())?;

        let mut clauses = Vec::new();

        if options.crop {
            let (w, h) = self.crop_aspect;
            let filter = format!("crop=ih/{}*{}:ih", h, w);
            clauses.push(Clause::new(ClauseKind::Crop, &["-filter:v", &filter]));
        }

        if self.should_truncate(entry)? {
            let limit = self.truncation.time_limit();
            clauses.push(Clause::new(ClauseKind::Truncation, &["-t", &limit]));
        }

        if options.animated {
            clauses.push(Clause::new(
                ClauseKind::Animation,
                &[
                    "-pixel_format",
                    &self.encoder.pixel_format,
                    "-map",
                    "0:v",
                    "-map",
                    "0:a",
                ],
            ));
        }

        if self.scan_type(&input_path).await? == ProbeResult::Interlaced {
            if options.crop {
                warn!(
                    path = %input_path.display(),
                    "crop filter replaces the deinterlace filter for interlaced input"
                );
            }
            clauses.push(Clause::new(
                ClauseKind::Deinterlace,
                &["-vf", &self.encoder.deinterlace_filter],
            ));
        }

        clauses.sort_by_key(|c| c.kind);
        let args = assemble_args(&self.encoder, &input_path, &output_path, &clauses);

        Ok(TranscodePlan {
            program: self.encoder.program.clone(),
            args,
            input_path,
            output_path,
            clauses: clauses.iter().map(|c| c.kind).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeProber, INTERLACED_LINE, PROGRESSIVE_LINE};
    use crate::manifest::Manifest;
    use proptest::prelude::*;

    fn get_args(plan: &TranscodePlan) -> Vec<String> {
        plan.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn has_flag_with_value(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|pair| pair[0] == flag && pair[1] == value)
    }

    fn entry(path: &str, duration: Option<&str>) -> ManifestEntry {
        let body = duration
            .map(|d| format!("<DURATION_READABLE>{}</DURATION_READABLE>", d))
            .unwrap_or_default();
        let xml = format!(r#"<M><FILE path="{}"><SIZE>1</SIZE>{}</FILE></M>"#, path, body);
        Manifest::parse(&xml).unwrap().entries()[0].clone()
    }

    fn builder(lines: &str) -> PlanBuilder<FakeProber> {
        PlanBuilder::new(&Config::default(), FakeProber::always(&[lines]))
    }

    #[tokio::test]
    async fn test_plain_progressive_plan_has_no_optional_clauses() {
        let plan = builder(PROGRESSIVE_LINE)
            .build(&entry("ep01.ts", Some("0:22:10.0")), Path::new("/media"), PlanOptions::default())
            .await
            .unwrap();
        let args = get_args(&plan);

        assert_eq!(plan.program, "ffmpeg");
        assert!(plan.clauses.is_empty());
        assert_eq!(
            args,
            vec![
                "-n", "-i", "/media/ep01.ts",
                "-c:v", "hevc_nvenc", "-profile:v", "main10", "-preset", "slow",
                "-rc", "vbr", "-c:a", "copy", "-sn",
                "/media/output HEVC/ep01.mkv",
            ]
        );
        assert!(!args.contains(&"-vf".to_string()));
        assert!(!args.contains(&"-pixel_format".to_string()));
        assert!(!args.contains(&"-t".to_string()));
    }

    #[tokio::test]
    async fn test_all_clauses_in_precedence_order() {
        let plan = builder(INTERLACED_LINE)
            .build(
                &entry("show/ep02.ts", Some("0:40:00")),
                Path::new("/media"),
                PlanOptions {
                    animated: true,
                    crop: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(
            plan.clauses,
            vec![
                ClauseKind::Deinterlace,
                ClauseKind::Animation,
                ClauseKind::Truncation,
                ClauseKind::Crop,
            ]
        );
        assert_eq!(
            get_args(&plan),
            vec![
                "-n", "-i", "/media/show/ep02.ts",
                "-vf", "yadif=1",
                "-pixel_format", "p010le", "-map", "0:v", "-map", "0:a",
                "-t", "32:00",
                "-filter:v", "crop=ih/3*4:ih",
                "-c:v", "hevc_nvenc", "-profile:v", "main10", "-preset", "slow",
                "-rc", "vbr", "-c:a", "copy", "-sn",
                "/media/output HEVC/ep02.mkv",
            ]
        );
    }

    #[tokio::test]
    async fn test_truncation_only_for_eligible_durations() {
        let b = builder(PROGRESSIVE_LINE);
        let root = Path::new("/m");

        let eligible = b.build(&entry("a.ts", Some("0:41:30")), root, PlanOptions::default()).await.unwrap();
        assert!(has_flag_with_value(&get_args(&eligible), "-t", "32:00"));

        for duration in [Some("0:42:00"), Some("1:40:00"), None] {
            let plan = b.build(&entry("a.ts", duration), root, PlanOptions::default()).await.unwrap();
            assert!(!plan.has_clause(ClauseKind::Truncation), "{duration:?}");
        }
    }

    #[tokio::test]
    async fn test_invalid_duration_fails_build() {
        let err = builder(PROGRESSIVE_LINE)
            .build(&entry("a.ts", Some("40:00")), Path::new("/m"), PlanOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlanError::Duration {
                source: DurationError::InvalidTimestamp(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_ambiguous_probe_fails_build() {
        for lines in [vec![], vec![PROGRESSIVE_LINE, INTERLACED_LINE]] {
            let b = PlanBuilder::new(&Config::default(), FakeProber::always(&lines));
            let err = b
                .build(&entry("a.ts", None), Path::new("/m"), PlanOptions::default())
                .await
                .unwrap_err();
            match err {
                PlanError::AmbiguousScanType { path } => assert_eq!(path, PathBuf::from("/m/a.ts")),
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[tokio::test]
    async fn test_prober_is_given_input_path() {
        let b = builder(PROGRESSIVE_LINE);
        b.build(&entry("dir/a.ts", None), Path::new("/m"), PlanOptions::default())
            .await
            .unwrap();
        assert_eq!(b.prober.calls(), vec![PathBuf::from("/m/dir/a.ts")]);
    }

    #[tokio::test]
    async fn test_custom_encoder_and_crop_aspect() {
        let mut config = Config::default();
        config.encoder.program = "/opt/ffmpeg".to_string();
        config.encoder.video_codec = "libx265".to_string();
        config.transcode.crop_aspect_width = 16;
        config.transcode.crop_aspect_height = 9;
        config.transcode.target_extension = ".mp4".to_string();
        config.transcode.output_dir = "/encoded".to_string();

        let b = PlanBuilder::new(&config, FakeProber::always(&[PROGRESSIVE_LINE]));
        let plan = b
            .build(
                &entry("a.ts", None),
                Path::new("/m"),
                PlanOptions {
                    animated: false,
                    crop: true,
                },
            )
            .await
            .unwrap();
        let args = get_args(&plan);

        assert_eq!(plan.program, "/opt/ffmpeg");
        assert!(has_flag_with_value(&args, "-c:v", "libx265"));
        assert!(has_flag_with_value(&args, "-filter:v", "crop=ih/9*16:ih"));
        assert_eq!(plan.output_path, PathBuf::from("/encoded/a.mp4"));
    }

    #[test]
    fn test_output_path_uses_basename() {
        let b = builder(PROGRESSIVE_LINE);
        assert_eq!(
            b.output_path(Path::new("/m"), "season 1/disc 2/ep.ts").unwrap(),
            PathBuf::from("/m/output HEVC/ep.mkv")
        );
        assert!(matches!(
            b.output_path(Path::new("/m"), ".."),
            Err(PlanError::InvalidEntryPath(_))
        ));
    }

    #[tokio::test]
    async fn test_command_line_and_command() {
        let plan = builder(PROGRESSIVE_LINE)
            .build(&entry("a.ts", None), Path::new("/m"), PlanOptions::default())
            .await
            .unwrap();
        assert!(plan.command_line().starts_with("ffmpeg -n -i /m/a.ts -c:v hevc_nvenc"));

        let cmd = plan.command();
        assert_eq!(cmd.get_program(), "ffmpeg");
        assert_eq!(cmd.get_args().count(), plan.args.len());
    }

    fn clause_strategy() -> impl Strategy<Value = Vec<ClauseKind>> {
        prop::sample::subsequence(
            vec![
                ClauseKind::Deinterlace,
                ClauseKind::Animation,
                ClauseKind::Truncation,
                ClauseKind::Crop,
            ],
            0..=4,
        )
        .prop_shuffle()
    }

    // Whatever order clauses are derived in, they are emitted contiguously,
    // after the input and before the codec, in fixed precedence.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_clause_precedence_is_fixed(kinds in clause_strategy()) {
            let clauses: Vec<Clause> = kinds
                .iter()
                .map(|k| Clause { kind: *k, args: vec![format!("--{:?}", k)] })
                .collect();
            let args = assemble_args(
                &EncoderConfig::default(),
                Path::new("in.ts"),
                Path::new("out.mkv"),
                &clauses,
            );
            let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

            let mut expected = kinds.clone();
            expected.sort();
            let emitted: Vec<String> = args[3..3 + expected.len()].to_vec();
            let expected: Vec<String> = expected.iter().map(|k| format!("--{:?}", k)).collect();

            prop_assert_eq!(&args[..3], &["-n", "-i", "in.ts"]);
            prop_assert_eq!(emitted, expected);
            prop_assert_eq!(args[3 + kinds.len()].as_str(), "-c:v");
            prop_assert_eq!(args.last().map(String::as_str), Some("out.mkv"));
        }
    }
}
