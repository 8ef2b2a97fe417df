//! CLI entry point for Media Ledger
//!
//! `reconcile` refreshes a manifest against a directory and writes a new
//! document next to it. `transcode` encodes every manifest entry in turn.

use clap::{Parser, Subcommand, ValueEnum};
use media_ledger::{
    listen_for_ctrl_c, run_reconciliation, run_startup_checks, BatchOptions, Config,
    FfmpegEncoder, FfprobeProber, Manifest, PlanOptions, ReconcileMode, ReconcileOptions,
    TranscodeBatch,
};
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Media Ledger - manifest reconciliation and batch transcoding
#[derive(Parser, Debug)]
#[command(name = "media-ledger")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a configuration file (TOML). Defaults are used when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile a manifest against the files under a directory
    Reconcile {
        /// Manifest to reconcile (left unmodified)
        manifest: PathBuf,

        /// Directory the manifest paths are relative to
        dir: PathBuf,

        /// md5sum-style checksum listing
        checksums: Option<PathBuf>,

        /// Migrate every entry path to this 3-character extension
        #[arg(long, value_name = "EXT")]
        rewrite_extension: Option<String>,

        /// Warn about unreferenced files instead of failing
        #[arg(long, conflicts_with = "strict")]
        lenient: bool,

        /// Fail when files are not referenced by the manifest
        #[arg(long)]
        strict: bool,

        /// Print the reconciliation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Transcode every manifest entry
    Transcode {
        /// Source material mode
        mode: Option<TranscodeMode>,

        /// Manifest to read (defaults to the configured name in the current directory)
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Log the planned commands without encoding
        #[arg(long)]
        dry_run: bool,

        /// Skip encoder/prober availability checks
        #[arg(long)]
        skip_checks: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TranscodeMode {
    /// Animated source: force the pixel format and map all video and audio
    Anime,
    /// Crop to the configured aspect ratio
    Crop,
}

fn plan_options(mode: Option<TranscodeMode>) -> PlanOptions {
    PlanOptions {
        animated: mode == Some(TranscodeMode::Anime),
        crop: mode == Some(TranscodeMode::Crop),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

// Library error messages already embed their source.
fn format_error(context: &str, err: &dyn Display) -> String {
    format!("{}: {}", context, err)
}

fn report_error(context: &str, err: &dyn Display) {
    eprintln!("{}", format_error(context, err));
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                report_error(&format!("Failed to load {}", path.display()), &e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::from_env(),
    };

    match args.command {
        Command::Reconcile {
            manifest,
            dir,
            checksums,
            rewrite_extension,
            lenient,
            strict,
            json,
        } => {
            let mut options = ReconcileOptions::from_config(&config.reconcile);
            if lenient {
                options.mode = ReconcileMode::Lenient;
            } else if strict {
                options.mode = ReconcileMode::Strict;
            }
            if rewrite_extension.is_some() {
                options.extension_rewrite = rewrite_extension;
            }

            let outcome = match run_reconciliation(
                &manifest,
                &dir,
                checksums.as_deref(),
                &options,
                &config.reconcile.output_suffix,
            ) {
                Ok(outcome) => outcome,
                Err(e) => {
                    report_error("Reconciliation failed", &e);
                    return ExitCode::FAILURE;
                }
            };

            if json {
                match outcome.to_json_pretty() {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        report_error("Failed to serialize report", &e);
                        return ExitCode::FAILURE;
                    }
                }
            } else {
                println!(
                    "Reconciled {} entries ({} rewritten) into {}",
                    outcome.report.entries,
                    outcome.report.rewritten,
                    outcome.output_path.display()
                );
                for file in &outcome.report.extra_files {
                    println!("  unreferenced: {}", file.display());
                }
            }
            ExitCode::SUCCESS
        }

        Command::Transcode {
            mode,
            manifest,
            dry_run,
            skip_checks,
        } => {
            if skip_checks || dry_run {
                warn!("skipping startup checks");
            } else if let Err(e) = run_startup_checks(&config) {
                report_error("Startup checks failed", &e);
                return ExitCode::FAILURE;
            }

            let manifest_path =
                manifest.unwrap_or_else(|| PathBuf::from(&config.transcode.manifest_name));
            let source_root = match manifest_path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => Path::new(".").to_path_buf(),
            };

            let document = match Manifest::load(&manifest_path) {
                Ok(document) => document,
                Err(e) => {
                    report_error(&format!("Failed to load {}", manifest_path.display()), &e);
                    return ExitCode::FAILURE;
                }
            };

            let interrupt = listen_for_ctrl_c();
            let batch = TranscodeBatch::new(
                &config,
                FfprobeProber::from_config(&config.probe),
                FfmpegEncoder::new(interrupt.clone()),
                interrupt,
            );
            let options = BatchOptions {
                plan: plan_options(mode),
                dry_run,
            };

            match batch.run(&document, &source_root, options).await {
                Ok(summary) => {
                    if dry_run {
                        for plan in &summary.planned {
                            println!("{}", plan.command_line());
                        }
                    }
                    info!(
                        encoded = summary.encoded.len(),
                        skipped = summary.skipped.len(),
                        "batch complete"
                    );
                    for skipped in &summary.skipped {
                        println!("  skipped {}: {}", skipped.path, skipped.reason);
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    report_error("Transcode batch stopped", &e);
                    ExitCode::FAILURE
                }
            }
        }
    }
}
