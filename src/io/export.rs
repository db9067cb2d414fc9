//! Export run results to CSV and JSON.
//!
//! Category columns carry labels, not indices, so the files can be joined back
//! to the inputs in spreadsheets or downstream scripts.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;

use crate::app::pipeline::{FailureCounts, FitStage, SynthesisRun};
use crate::domain::CategoryScheme;
use crate::error::AppError;
use crate::fit::PopulationTotals;
use crate::sample::{Assignment, MatchGap, SimilarityIndex, StageTally};

/// Canonical file names written by `synthpop run`.
pub const ASSIGNMENTS_FILE: &str = "assignments.csv";
pub const GAPS_FILE: &str = "gaps.csv";
pub const IPF_COUNTS_FILE: &str = "ipf_counts.csv";
pub const SUMMARY_FILE: &str = "summary.json";

/// Machine-readable run summary (`summary.json`).
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary<'a> {
    pub generated_at: String,
    pub seed: u64,
    pub geographies_fitted: usize,
    pub households: usize,
    pub gap_cells: usize,
    pub gap_households: u64,
    pub row_errors: usize,
    pub totals: &'a PopulationTotals,
    pub failures: &'a FailureCounts,
    pub stages: &'a std::collections::BTreeMap<String, StageTally>,
    pub degenerate_regions: Vec<&'a str>,
    pub unmapped_geographies: &'a [String],
}

impl<'a> RunSummary<'a> {
    pub fn from_run(run: &'a SynthesisRun) -> Self {
        Self {
            generated_at: Utc::now().to_rfc3339(),
            seed: run.seed,
            geographies_fitted: run.fit.fits.len(),
            households: run.assignments.len(),
            gap_cells: run.gaps.len(),
            gap_households: run.gaps.iter().map(|g| u64::from(g.target.count)).sum(),
            row_errors: run.row_errors,
            totals: &run.fit.totals,
            failures: &run.failures,
            stages: &run.stages,
            degenerate_regions: run.degenerate_regions.iter().map(|r| r.as_str()).collect(),
            unmapped_geographies: &run.unmapped_geographies,
        }
    }
}

/// Write every `run` artifact into `dir` (created if missing); returns the paths written.
pub fn write_run_outputs(dir: &Path, run: &SynthesisRun, scheme: &CategoryScheme) -> Result<Vec<PathBuf>, AppError> {
    std::fs::create_dir_all(dir)
        .map_err(|e| AppError::new(2, format!("Failed to create output directory '{}': {e}", dir.display())))?;

    let assignments = dir.join(ASSIGNMENTS_FILE);
    let gaps = dir.join(GAPS_FILE);
    let ipf_counts = dir.join(IPF_COUNTS_FILE);
    let summary = dir.join(SUMMARY_FILE);

    write_assignments_csv(&assignments, &run.assignments)?;
    write_gaps_csv(&gaps, &run.gaps, scheme)?;
    write_ipf_counts_csv(&ipf_counts, &run.fit, scheme)?;
    write_summary_json(&summary, &RunSummary::from_run(run))?;

    Ok(vec![assignments, gaps, ipf_counts, summary])
}

pub fn write_assignments_csv(path: &Path, assignments: &[Assignment]) -> Result<(), AppError> {
    let mut writer = csv_writer(path)?;
    writer
        .write_record(["geography", "region", "serial_no", "record_region", "relaxation"])
        .map_err(write_err(path))?;
    for a in assignments {
        writer
            .write_record([
                a.geography.as_str(),
                a.region.as_str(),
                a.serial_no.as_str(),
                a.record_region.as_str(),
                a.relaxation.as_str(),
            ])
            .map_err(write_err(path))?;
    }
    writer.flush().map_err(|e| write_err(path)(e.into()))
}

pub fn write_gaps_csv(path: &Path, gaps: &[MatchGap], scheme: &CategoryScheme) -> Result<(), AppError> {
    let mut writer = csv_writer(path)?;
    writer
        .write_record([
            "geography",
            "region",
            "size",
            "age",
            "income",
            "race",
            "ethnicity",
            "count",
            "relaxation",
        ])
        .map_err(write_err(path))?;
    for gap in gaps {
        let t = &gap.target;
        let [size, age, income, race, ethnicity] = scheme.combo_labels(&t.combo);
        let count = t.count.to_string();
        let relaxation = gap.relaxation.to_string();
        writer
            .write_record([
                t.geography.as_str(),
                t.region.as_str(),
                size,
                age,
                income,
                race,
                ethnicity,
                count.as_str(),
                relaxation.as_str(),
            ])
            .map_err(write_err(path))?;
    }
    writer.flush().map_err(|e| write_err(path)(e.into()))
}

/// One row per fitted cell: the IPF estimate next to the committed count.
pub fn write_ipf_counts_csv(path: &Path, stage: &FitStage, scheme: &CategoryScheme) -> Result<(), AppError> {
    let mut writer = csv_writer(path)?;
    writer
        .write_record(["geography", "size", "age", "income", "race", "ethnicity", "estimate", "count"])
        .map_err(write_err(path))?;
    for (cell, count) in stage.estimates() {
        let [size, age, income, race, ethnicity] = scheme.combo_labels(&cell.combo);
        let estimate = format!("{:.6}", cell.estimate);
        let count = count.to_string();
        writer
            .write_record([
                cell.geography.as_str(),
                size,
                age,
                income,
                race,
                ethnicity,
                estimate.as_str(),
                count.as_str(),
            ])
            .map_err(write_err(path))?;
    }
    writer.flush().map_err(|e| write_err(path)(e.into()))
}

/// Region-by-region weight matrix: first column is the source region.
pub fn write_similarity_csv(path: &Path, index: &SimilarityIndex) -> Result<(), AppError> {
    let mut writer = csv_writer(path)?;
    let mut header = vec!["region".to_string()];
    header.extend(index.regions().iter().map(|r| r.to_string()));
    writer.write_record(&header).map_err(write_err(path))?;

    for region in index.regions() {
        let Some(row) = index.row(region) else {
            continue;
        };
        let mut record = vec![region.to_string()];
        record.extend(row.iter().map(|w| format!("{w:.10}")));
        writer.write_record(&record).map_err(write_err(path))?;
    }
    writer.flush().map_err(|e| write_err(path)(e.into()))
}

pub fn write_summary_json(path: &Path, summary: &RunSummary<'_>) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create summary JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, summary)
        .map_err(|e| AppError::new(2, format!("Failed to write summary JSON '{}': {e}", path.display())))
}

fn csv_writer(path: &Path) -> Result<csv::Writer<File>, AppError> {
    csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))
}

fn write_err(path: &Path) -> impl Fn(csv::Error) -> AppError + '_ {
    move |e| AppError::new(2, format!("Failed to write export CSV '{}': {e}", path.display()))
}
