//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the "real main" that:
//! - parses CLI arguments and installs logging
//! - resolves the run configuration
//! - sizes the rayon pool
//! - dispatches to the pipeline and writes outputs

use clap::Parser;
use tracing::{debug, info};

use crate::cli::{Command, ConfigArgs, FitArgs, RunArgs, SimilarityArgs};
use crate::config::SynthConfig;
use crate::error::AppError;
use crate::io::{export, ingest};
use crate::sample::{MicrodataPool, SimilarityIndex};

pub mod pipeline;

/// Row errors echoed to stderr before the summary.
const ROW_ERROR_PREVIEW: usize = 10;

/// Entry point for the `synthpop` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    crate::logging::init(cli.verbose);

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Fit(args) => handle_fit(args),
        Command::Similarity(args) => handle_similarity(args),
    }
}

fn load_config(args: &ConfigArgs) -> Result<SynthConfig, AppError> {
    let config = SynthConfig::load(args.config.as_deref(), &args.overrides())?;
    configure_threads(config.threads)?;
    debug!(?config, "resolved configuration");
    Ok(config)
}

fn configure_threads(threads: usize) -> Result<(), AppError> {
    if threads == 0 {
        return Ok(());
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .map_err(|e| AppError::new(2, format!("Failed to size thread pool to {threads}: {e}")))
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let config = load_config(&args.config)?;
    let scheme = config.scheme()?;

    let inputs = ingest::Inputs::load(&args.marginals, &args.microdata, &args.crosswalk, &scheme)?;
    if !inputs.row_errors.is_empty() {
        eprint!(
            "{}",
            crate::report::format_row_errors(&inputs.row_errors, ROW_ERROR_PREVIEW)
        );
    }

    let run = pipeline::run_synthesis(&inputs, &config)?;
    println!("{}", crate::report::format_run_summary(&run));

    let written = export::write_run_outputs(&args.out_dir, &run, &scheme)?;
    for path in &written {
        info!(path = %path.display(), "wrote output");
    }
    Ok(())
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = load_config(&args.config)?;
    let scheme = config.scheme()?;

    let marginals = ingest::load_marginals(&args.marginals, &scheme)?;
    if !marginals.row_errors.is_empty() {
        eprint!(
            "{}",
            crate::report::format_row_errors(&marginals.row_errors, ROW_ERROR_PREVIEW)
        );
    }

    let stage = pipeline::fit_and_round(&marginals.geographies, &scheme, &config)?;
    println!("{}", crate::report::format_fit_summary(&stage));

    export::write_ipf_counts_csv(&args.out, &stage, &scheme)?;
    info!(path = %args.out.display(), cells = stage.estimates().count(), "wrote cell estimates");
    Ok(())
}

fn handle_similarity(args: SimilarityArgs) -> Result<(), AppError> {
    let config = load_config(&args.config)?;
    let scheme = config.scheme()?;

    let microdata = ingest::load_microdata(&args.microdata, &scheme)?;
    let pool = MicrodataPool::new(microdata.records);
    if pool.is_empty() {
        return Err(AppError::new(3, "No valid microdata records to profile."));
    }

    let index = SimilarityIndex::build(&pool, &config.similarity.profile, &[]);
    export::write_similarity_csv(&args.out, &index)?;
    info!(path = %args.out.display(), regions = index.regions().len(), "wrote similarity weights");
    Ok(())
}
