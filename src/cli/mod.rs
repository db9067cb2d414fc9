//! Command-line parsing for the synthetic population builder.
//!
//! Argument parsing is kept separate from the pipeline so the library stays
//! usable without a terminal.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::CliOverrides;
use crate::fit::RoundingKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "synthpop",
    version,
    about = "Synthetic household populations from census marginals and survey microdata"
)]
pub struct Cli {
    /// Raise the default log level to debug (`SYNTHPOP_LOG` still wins).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit, round, match and draw: write households per geography.
    Run(RunArgs),
    /// Run IPF only and write the rounded cell counts.
    Fit(FitArgs),
    /// Write the region-to-region similarity weights for a microdata file.
    Similarity(SimilarityArgs),
}

/// Options shared by subcommands that resolve a `SynthConfig`.
#[derive(Debug, Args, Clone, Default)]
pub struct ConfigArgs {
    /// TOML config file.
    #[arg(long, value_name = "TOML")]
    pub config: Option<PathBuf>,

    /// Run seed (overrides config and `SYNTHPOP_SEED`).
    #[arg(long)]
    pub seed: Option<u64>,

    /// Worker threads, 0 = one per core (overrides config and `SYNTHPOP_THREADS`).
    #[arg(long)]
    pub threads: Option<usize>,

    /// Rounding rule for cell counts.
    #[arg(long, value_enum)]
    pub rounding: Option<RoundingKind>,
}

impl ConfigArgs {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            seed: self.seed,
            threads: self.threads,
            rounding: self.rounding,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Long-format marginals CSV (`geography,variable,category,count`).
    #[arg(long, value_name = "CSV")]
    pub marginals: PathBuf,

    /// Microdata CSV (`serial_no,region,size,age,income,race,ethnicity`).
    #[arg(long, value_name = "CSV")]
    pub microdata: PathBuf,

    /// Geography to sampling-region crosswalk CSV (`geography,region`).
    #[arg(long, value_name = "CSV")]
    pub crosswalk: PathBuf,

    /// Directory for `assignments.csv`, `gaps.csv`, `ipf_counts.csv`, `summary.json`.
    #[arg(long, value_name = "DIR")]
    pub out_dir: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    /// Long-format marginals CSV.
    #[arg(long, value_name = "CSV")]
    pub marginals: PathBuf,

    /// Output CSV of rounded cell counts.
    #[arg(long, value_name = "CSV")]
    pub out: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,
}

#[derive(Debug, Args, Clone)]
pub struct SimilarityArgs {
    /// Microdata CSV.
    #[arg(long, value_name = "CSV")]
    pub microdata: PathBuf,

    /// Output CSV of region weights.
    #[arg(long, value_name = "CSV")]
    pub out: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,
}
