//! Shared synthesis pipeline used by the CLI subcommands.
//!
//! crosswalk -> IPF per geography -> rounding -> similarity -> match + draw per region
//!
//! Per-geography and per-cell failures are counted, not fatal; only an empty
//! draw pool or having nothing left to work with stops a run.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::SynthConfig;
use crate::domain::{CategoryCombo, CategoryScheme, CellTarget, FittedCell, Geography, RegionId, RoundedCell};
use crate::error::SynthError;
use crate::fit::{GeographyFit, IpfFitter, PopulationTotals, population_totals};
use crate::io::ingest::Inputs;
use crate::sample::{Assignment, MatchGap, MicrodataPool, SamplingEngine, SimilarityIndex, StageTally};

/// Non-fatal failures, by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FailureCounts {
    pub shape_mismatch: usize,
    pub convergence_failure: usize,
    pub degenerate_region: usize,
    pub no_match: usize,
    pub unknown_region: usize,
    /// Geographies whose variables disagree on the population total.
    pub inconsistent_marginals: usize,
}

impl FailureCounts {
    pub fn total(&self) -> usize {
        self.shape_mismatch
            + self.convergence_failure
            + self.degenerate_region
            + self.no_match
            + self.unknown_region
            + self.inconsistent_marginals
    }
}

/// Relative gap between a variable's total and the size total that still counts as consistent.
pub const TOTAL_DRIFT_TOLERANCE: f64 = 1e-6;

/// Output of the fit + rounding phase.
#[derive(Debug, Clone)]
pub struct FitStage {
    pub fits: Vec<GeographyFit>,
    /// Cells with a positive rounded count, in geography then combination order.
    pub cells: Vec<RoundedCell>,
    pub totals: PopulationTotals,
    pub failures: FailureCounts,
}

impl FitStage {
    /// Every fitted cell with its real-valued estimate and committed count (0 when rounded away).
    pub fn estimates(&self) -> impl Iterator<Item = (&FittedCell, u32)> {
        let committed: HashMap<(&str, CategoryCombo), u32> = self
            .cells
            .iter()
            .map(|c| ((c.geography.as_str(), c.combo), c.count))
            .collect();
        self.fits.iter().flat_map(|f| &f.cells).map(move |cell| {
            let count = committed
                .get(&(cell.geography.as_str(), cell.combo))
                .copied()
                .unwrap_or(0);
            (cell, count)
        })
    }
}

/// All computed outputs of a single `synthpop run`.
#[derive(Debug, Clone)]
pub struct SynthesisRun {
    pub seed: u64,
    pub fit: FitStage,
    pub assignments: Vec<Assignment>,
    pub gaps: Vec<MatchGap>,
    /// Filled cells and households per relaxation descriptor.
    pub stages: BTreeMap<String, StageTally>,
    pub degenerate_regions: Vec<RegionId>,
    pub unmapped_geographies: Vec<String>,
    pub row_errors: usize,
    pub failures: FailureCounts,
}

/// Fit every geography and round the estimates to household counts.
pub fn fit_and_round(
    geographies: &[Geography],
    scheme: &CategoryScheme,
    config: &SynthConfig,
) -> Result<FitStage, SynthError> {
    if geographies.is_empty() {
        return Err(SynthError::InsufficientData("no geographies to fit".to_string()));
    }

    let fitter = IpfFitter::from_config(&config.ipf);
    let mut failures = FailureCounts::default();
    let mut fits = Vec::with_capacity(geographies.len());
    let mut reference = 0.0;

    for (geo, result) in geographies.iter().zip(fitter.fit_geographies(geographies, scheme)) {
        let drift = geo.marginals.total_drift();
        if drift > TOTAL_DRIFT_TOLERANCE * geo.population().max(1.0) {
            failures.inconsistent_marginals += 1;
            warn!(
                geography = %geo.id,
                population = geo.population(),
                drift,
                "marginal totals disagree; the last raked variable sets the fitted total"
            );
        }

        match result {
            Ok(fit) => {
                if !fit.converged {
                    failures.convergence_failure += 1;
                    let error = SynthError::ConvergenceFailure {
                        iterations: fit.iterations,
                        max_change: fit.max_change,
                    };
                    if !config.ipf.allow_unconverged {
                        warn!(geography = %geo.id, %error, "dropping unconverged geography");
                        continue;
                    }
                    warn!(geography = %geo.id, %error, "keeping unconverged fit");
                }
                reference += geo.population();
                fits.push(fit);
            }
            Err(error @ SynthError::ShapeMismatch { .. }) => {
                failures.shape_mismatch += 1;
                warn!(geography = %geo.id, %error, "skipping geography");
            }
            Err(other) => return Err(other),
        }
    }

    let rule = config.rounding_rule();
    let all_cells: Vec<_> = fits.iter().flat_map(|f| f.cells.iter().cloned()).collect();
    let totals = population_totals(reference, &all_cells, rule, config.seed);

    let cells: Vec<RoundedCell> = all_cells
        .into_iter()
        .filter_map(|cell| {
            let count = rule.round_cell(&cell, config.seed);
            (count > 0).then(|| RoundedCell {
                geography: cell.geography,
                combo: cell.combo,
                count,
            })
        })
        .collect();

    info!(
        geographies = fits.len(),
        cells = cells.len(),
        reference = totals.reference,
        ipf_estimated = totals.ipf_estimated,
        committed = totals.committed,
        rule = %totals.committed_rule,
        "fitted and rounded"
    );

    Ok(FitStage {
        fits,
        cells,
        totals,
        failures,
    })
}

/// Execute the full pipeline over loaded inputs.
pub fn run_synthesis(inputs: &Inputs, config: &SynthConfig) -> Result<SynthesisRun, SynthError> {
    let scheme = config.scheme()?;

    // 1) Attach sampling regions.
    let mut geographies = inputs.geographies.clone();
    let unmapped_geographies = inputs.crosswalk.assign(&mut geographies);
    for id in &unmapped_geographies {
        warn!(geography = %id, "no crosswalk entry; skipping geography");
    }
    geographies.retain(|g| g.region.is_some());
    if geographies.is_empty() {
        return Err(SynthError::InsufficientData(
            "no geography maps to a sampling region".to_string(),
        ));
    }

    // 2) Fit and round.
    let fit = fit_and_round(&geographies, &scheme, config)?;
    let mut failures = fit.failures;
    failures.unknown_region = unmapped_geographies.len();

    // 3) Similarity over the microdata regions.
    let pool = MicrodataPool::new(inputs.microdata.clone());
    if pool.is_empty() {
        return Err(SynthError::InsufficientData("microdata pool is empty".to_string()));
    }
    let region_of: BTreeMap<&str, &RegionId> = geographies
        .iter()
        .filter_map(|g| g.region.as_ref().map(|r| (g.id.as_str(), r)))
        .collect();
    let expected: Vec<RegionId> = region_of
        .values()
        .map(|r| (*r).clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let similarity = SimilarityIndex::build(&pool, &config.similarity.profile, &expected);
    failures.degenerate_region = similarity.degenerate().len();

    // 4) Match and draw, one region per task.
    let mut by_region: BTreeMap<RegionId, Vec<CellTarget>> = BTreeMap::new();
    for cell in &fit.cells {
        let Some(region) = region_of.get(cell.geography.as_str()) else {
            continue;
        };
        by_region.entry((*region).clone()).or_default().push(CellTarget {
            geography: cell.geography.clone(),
            region: (*region).clone(),
            combo: cell.combo,
            count: cell.count,
        });
    }

    let engine = SamplingEngine::new(&pool, &scheme, &similarity, config.seed);
    let outcome = engine.sample_regions(&by_region)?;
    failures.no_match = outcome.gaps.len();

    // Cells are processed in combination order, so a stable sort keeps it per geography.
    let mut assignments = outcome.assignments;
    assignments.sort_by(|a, b| a.geography.cmp(&b.geography));
    let mut gaps = outcome.gaps;
    gaps.sort_by(|a, b| {
        (&a.target.geography, a.target.combo).cmp(&(&b.target.geography, b.target.combo))
    });

    info!(
        households = assignments.len(),
        gaps = gaps.len(),
        failures = failures.total(),
        "synthesis complete"
    );

    Ok(SynthesisRun {
        seed: config.seed,
        fit,
        assignments,
        gaps,
        stages: outcome.tallies,
        degenerate_regions: similarity.degenerate().to_vec(),
        unmapped_geographies,
        row_errors: inputs.row_errors.len(),
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Marginals, MicrodataRecord};
    use crate::io::ingest::Crosswalk;

    fn scheme() -> CategoryScheme {
        let owned = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        CategoryScheme::from_labels([
            owned(&["1", "2", "3"]),
            owned(&["a", "b", "c"]),
            owned(&["lo", "mid", "hi"]),
            owned(&["w", "b"]),
            owned(&["h", "n"]),
        ])
        .unwrap()
    }

    fn config() -> SynthConfig {
        let mut config = SynthConfig::default();
        let s = scheme();
        config.labels.size = s.get(crate::domain::Variable::Size).labels().to_vec();
        config.labels.age = s.get(crate::domain::Variable::Age).labels().to_vec();
        config.labels.income = s.get(crate::domain::Variable::Income).labels().to_vec();
        config.labels.race = s.get(crate::domain::Variable::Race).labels().to_vec();
        config.labels.ethnicity = s.get(crate::domain::Variable::Ethnicity).labels().to_vec();
        config
    }

    fn geography(id: &str) -> Geography {
        geography_with_size(id, 4.0)
    }

    /// Every variable totals 4 except size, which totals `size`.
    fn geography_with_size(id: &str, size: f64) -> Geography {
        Geography {
            id: id.to_string(),
            region: None,
            marginals: Marginals::new([
                vec![0.0, size, 0.0],
                vec![0.0, 4.0, 0.0],
                vec![0.0, 0.0, 4.0],
                vec![4.0, 0.0],
                vec![0.0, 4.0],
            ])
            .unwrap(),
        }
    }

    fn record(serial: &str, region: &str, combo: [usize; 5]) -> MicrodataRecord {
        MicrodataRecord {
            serial_no: serial.to_string(),
            region: RegionId::new(region),
            combo,
        }
    }

    #[test]
    fn fit_and_round_commits_offset_counts() {
        let stage = fit_and_round(&[geography("G1")], &scheme(), &config()).unwrap();
        assert_eq!(stage.cells.len(), 1);
        assert_eq!(stage.cells[0].combo, [1, 1, 2, 0, 1]);
        assert_eq!(stage.cells[0].count, 4);
        assert_eq!(stage.totals.reference, 4.0);
        assert_eq!(stage.totals.committed, 4);
        assert_eq!(stage.failures, FailureCounts::default());
    }

    #[test]
    fn run_counts_unmapped_geographies() {
        let inputs = Inputs {
            geographies: vec![geography("G1"), geography("G2")],
            microdata: vec![record("H1", "P1", [1, 1, 2, 0, 1])],
            crosswalk: Crosswalk::from_pairs([("G1", "P1")]),
            row_errors: Vec::new(),
        };
        let run = run_synthesis(&inputs, &config()).unwrap();

        assert_eq!(run.failures.unknown_region, 1);
        assert_eq!(run.unmapped_geographies, vec!["G2".to_string()]);
        assert_eq!(run.assignments.len(), 4);
        assert!(run.assignments.iter().all(|a| a.serial_no == "H1" && a.relaxation == "None."));
        assert!(run.gaps.is_empty());
    }

    #[test]
    fn empty_inputs_are_insufficient() {
        let inputs = Inputs {
            geographies: vec![geography("G1")],
            microdata: Vec::new(),
            crosswalk: Crosswalk::from_pairs([("G1", "P1")]),
            row_errors: Vec::new(),
        };
        let err = run_synthesis(&inputs, &config()).unwrap_err();
        assert!(matches!(err, SynthError::InsufficientData(_)));

        let inputs = Inputs {
            crosswalk: Crosswalk::default(),
            ..inputs
        };
        assert!(matches!(
            run_synthesis(&inputs, &config()),
            Err(SynthError::InsufficientData(_))
        ));
    }

    #[test]
    fn inconsistent_marginal_totals_are_counted() {
        let geographies = [geography_with_size("G1", 1.0), geography("G2")];
        let stage = fit_and_round(&geographies, &scheme(), &config()).unwrap();

        assert_eq!(stage.failures.inconsistent_marginals, 1);
        assert_eq!(stage.failures.total(), 1);
        // Still fitted; the later variables' total of 4 wins.
        assert_eq!(stage.fits.len(), 2);
        assert_eq!(stage.totals.reference, 5.0);
        assert_eq!(stage.cells[0].count, 4);
    }

    #[test]
    fn unconverged_fits_are_dropped_when_disallowed() {
        let mut config = config();
        config.ipf.max_iterations = 1;

        let kept = fit_and_round(&[geography("G1")], &scheme(), &config).unwrap();
        assert_eq!(kept.fits.len(), 1);
        assert!(!kept.fits[0].converged);
        assert_eq!(kept.failures.convergence_failure, 1);

        config.ipf.allow_unconverged = false;
        let dropped = fit_and_round(&[geography("G1"), geography("G2")], &scheme(), &config).unwrap();
        assert!(dropped.fits.is_empty());
        assert!(dropped.cells.is_empty());
        assert_eq!(dropped.failures.convergence_failure, 2);
        assert_eq!(dropped.totals.reference, 0.0);
    }

    #[test]
    fn region_without_microdata_draws_state_wide() {
        let inputs = Inputs {
            geographies: vec![geography("G1")],
            microdata: vec![record("H1", "P1", [1, 1, 2, 0, 1])],
            crosswalk: Crosswalk::from_pairs([("G1", "P9")]),
            row_errors: Vec::new(),
        };
        let run = run_synthesis(&inputs, &config()).unwrap();

        assert_eq!(run.degenerate_regions, vec![RegionId::new("P9")]);
        assert_eq!(run.failures.degenerate_region, 1);
        assert_eq!(run.assignments.len(), 4);
        assert!(run.assignments.iter().all(|a| {
            a.region == RegionId::new("P9")
                && a.record_region == RegionId::new("P1")
                && a.relaxation == "state weights added."
        }));
        assert!(run.gaps.is_empty());
    }
}
