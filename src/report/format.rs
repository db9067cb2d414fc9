//! Formatted terminal output.
//!
//! Formatting lives here so the pipeline stays free of presentation and output
//! changes stay localized.

use crate::app::pipeline::{FailureCounts, FitStage, SynthesisRun};
use crate::fit::PopulationTotals;
use crate::io::ingest::RowError;

/// Format the full `run` summary: totals, failures and the relaxation histogram.
pub fn format_run_summary(run: &SynthesisRun) -> String {
    let mut out = String::new();

    out.push_str("=== synthpop - synthetic household population ===\n");
    out.push_str(&format!("Seed: {}\n", run.seed));
    out.push_str(&format!(
        "Geographies fitted: {} | households: {} | gap cells: {}\n",
        run.fit.fits.len(),
        run.assignments.len(),
        run.gaps.len()
    ));
    if run.row_errors > 0 {
        out.push_str(&format!("Input rows skipped or patched: {}\n", run.row_errors));
    }

    out.push('\n');
    out.push_str(&format_totals(&run.fit.totals));
    out.push('\n');
    out.push_str(&format_failures(&run.failures));

    out.push_str("\nRelaxation stages:\n");
    if run.stages.is_empty() {
        out.push_str("  (no cells filled)\n");
    }
    let total_households: u64 = run.stages.values().map(|t| t.households).sum();
    for (descriptor, tally) in &run.stages {
        out.push_str(&format!(
            "  {:>7} cells {:>9} households {:>6}  {descriptor}\n",
            tally.cells,
            tally.households,
            pct(tally.households, total_households),
        ));
    }

    if !run.degenerate_regions.is_empty() {
        let names: Vec<&str> = run.degenerate_regions.iter().map(|r| r.as_str()).collect();
        out.push_str(&format!("\nRegions without microdata: {}\n", names.join(", ")));
    }

    out
}

/// Format the `fit` subcommand summary.
pub fn format_fit_summary(stage: &FitStage) -> String {
    let mut out = String::new();
    out.push_str("=== synthpop - IPF fit ===\n");
    let converged = stage.fits.iter().filter(|f| f.converged).count();
    let max_iterations = stage.fits.iter().map(|f| f.iterations).max().unwrap_or(0);
    out.push_str(&format!(
        "Geographies: {} ({converged} converged, max {max_iterations} iterations) | cells: {}\n\n",
        stage.fits.len(),
        stage.cells.len()
    ));
    out.push_str(&format_totals(&stage.totals));
    out.push('\n');
    out.push_str(&format_failures(&stage.failures));
    out
}

pub fn format_totals(totals: &PopulationTotals) -> String {
    let mut out = String::new();
    out.push_str("Population totals:\n");
    out.push_str(&format!("  reference              {:>12.0}\n", totals.reference));
    out.push_str(&format!("  IPF estimated          {:>12}\n", totals.ipf_estimated));
    out.push_str(&format!("  probabilistic rounding {:>12}\n", totals.probabilistic_rounded));
    out.push_str(&format!("  nearest rounding       {:>12}\n", totals.nearest_rounded));
    out.push_str(&format!(
        "  committed              {:>12}  ({})\n",
        totals.committed, totals.committed_rule
    ));
    out
}

pub fn format_failures(failures: &FailureCounts) -> String {
    if failures.total() == 0 {
        return "Failures: none\n".to_string();
    }
    let rows = [
        ("shape mismatch", failures.shape_mismatch),
        ("convergence failure", failures.convergence_failure),
        ("degenerate region", failures.degenerate_region),
        ("no match", failures.no_match),
        ("unknown region", failures.unknown_region),
        ("inconsistent totals", failures.inconsistent_marginals),
    ];
    let mut out = String::from("Failures:\n");
    for (name, count) in rows.iter().filter(|(_, c)| *c > 0) {
        out.push_str(&format!("  {name:<20} {count:>8}\n"));
    }
    out
}

/// First `limit` row errors, one per line.
pub fn format_row_errors(errors: &[RowError], limit: usize) -> String {
    let mut out = String::new();
    for e in errors.iter().take(limit) {
        let id = e.id.as_deref().map(|id| format!(" [{id}]")).unwrap_or_default();
        out.push_str(&format!("  {}:{}{id} {}\n", e.source, e.line, e.message));
    }
    if errors.len() > limit {
        out.push_str(&format!("  ... {} more\n", errors.len() - limit));
    }
    out
}

fn pct(part: u64, whole: u64) -> String {
    if whole == 0 {
        return "-".to_string();
    }
    format!("{:.1}%", 100.0 * part as f64 / whole as f64)
}
