use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use xtal_collate::aligner::{Aligner, AlignerOptions, LinkOnlyUpdater};
use xtal_collate::collator::Collator;
use xtal_collate::config::ConfigLoader;
use xtal_collate::error::CollateError;
use xtal_collate::extract::PdbTextTools;
use xtal_collate::output::{HumanOutput, JsonOutput, OutputMode};
use xtal_collate::report::StageReport;
use xtal_collate::validator::ManifestReader;

#[derive(Parser)]
#[command(name = "xtal-collate")]
#[command(about = "Versioned collation and incremental alignment bookkeeping for crystal uploads")]
#[command(version, author)]
struct Cli {
    /// Print stage summaries as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Validate an upload and collate it into the newest version directory")]
    Collate(CollateArgs),
    #[command(about = "Reconcile alignment state and write the aligned metadata")]
    Align(AlignArgs),
}

#[derive(Args)]
struct CollateArgs {
    #[arg(short, long)]
    config: Option<Utf8PathBuf>,

    /// Only validate, do not write anything
    #[arg(short, long)]
    validate: bool,
}

#[derive(Args)]
struct AlignArgs {
    #[arg(short = 'd', long)]
    version_dir: Utf8PathBuf,

    #[arg(short, long)]
    metadata_file: Option<String>,

    #[arg(short, long)]
    xtalforms: Option<Utf8PathBuf>,

    #[arg(short, long)]
    assemblies: Option<Utf8PathBuf>,

    /// Only validate, do not write anything
    #[arg(short, long)]
    validate: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<CollateError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &CollateError) -> u8 {
    match error {
        CollateError::MissingConfig(_) | CollateError::VersionNotFound(_) => 2,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    match cli.command {
        Commands::Collate(args) => run_collate(args, mode),
        Commands::Align(args) => run_align(args, mode),
    }
}

fn run_collate(args: CollateArgs, mode: OutputMode) -> miette::Result<()> {
    let config = ConfigLoader::resolve(args.config.as_deref())?;
    let reader = ManifestReader;
    let collator = Collator::new(&config, &reader);

    let (meta, report) = collator.validate();
    if args.validate || report.has_errors() {
        print_validation(&report, mode)?;
        return check_validation(&report, args.validate);
    }
    let meta = meta.ok_or(CollateError::Validation { errors: 0 })?;

    let summary = collator.run(meta)?;
    match mode {
        OutputMode::Json => JsonOutput::print_collation(&summary),
        OutputMode::Human => HumanOutput::print_collation(&summary),
    }
    .into_diagnostic()
}

fn run_align(args: AlignArgs, mode: OutputMode) -> miette::Result<()> {
    let aligner = Aligner::new(AlignerOptions {
        version_dir: args.version_dir,
        metadata_file: args.metadata_file,
        xtalforms: args.xtalforms,
        assemblies: args.assemblies,
    });

    let report = aligner.validate();
    if args.validate || report.has_errors() {
        print_validation(&report, mode)?;
        return check_validation(&report, args.validate);
    }

    let summary = aligner.run(&LinkOnlyUpdater, &PdbTextTools)?;
    match mode {
        OutputMode::Json => JsonOutput::print_alignment(&summary),
        OutputMode::Human => HumanOutput::print_alignment(&summary),
    }
    .into_diagnostic()
}

fn print_validation(report: &StageReport, mode: OutputMode) -> miette::Result<()> {
    match mode {
        OutputMode::Json => JsonOutput::print_validation(report),
        OutputMode::Human => HumanOutput::print_validation(report),
    }
    .into_diagnostic()
}

fn check_validation(report: &StageReport, validate_only: bool) -> miette::Result<()> {
    if report.has_errors() && !validate_only {
        return Err(CollateError::Validation {
            errors: report.errors.len(),
        }
        .into());
    }
    Ok(())
}
