//! Per-region sampling: match every rounded cell, then draw its households.
//!
//! Regions are independent once the pool and similarity table are built, so they
//! run in parallel; each cell draws from its own seeded RNG, which keeps the
//! output identical regardless of thread count.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{CategoryScheme, CellTarget, RegionId};
use crate::error::SynthError;
use crate::sample::drawer::{Assignment, SampleDrawer};
use crate::sample::matcher::{MatchGap, MatchOutcome, RecordMatcher};
use crate::sample::pool::MicrodataPool;
use crate::sample::similarity::SimilarityIndex;

/// Cells and households resolved at one relaxation descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageTally {
    pub cells: usize,
    pub households: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RegionOutcome {
    pub assignments: Vec<Assignment>,
    pub gaps: Vec<MatchGap>,
    /// Filled cells keyed by descriptor text ("None.", "size expanded.", ...).
    pub tallies: BTreeMap<String, StageTally>,
}

impl RegionOutcome {
    fn tally(&mut self, descriptor: String, households: u32) {
        let entry = self.tallies.entry(descriptor).or_default();
        entry.cells += 1;
        entry.households += u64::from(households);
    }

    /// Fold another region's outcome into this one.
    pub fn merge(&mut self, other: RegionOutcome) {
        self.assignments.extend(other.assignments);
        self.gaps.extend(other.gaps);
        for (descriptor, t) in other.tallies {
            let entry = self.tallies.entry(descriptor).or_default();
            entry.cells += t.cells;
            entry.households += t.households;
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SamplingEngine<'a> {
    matcher: RecordMatcher<'a>,
    drawer: SampleDrawer<'a>,
    run_seed: u64,
}

impl<'a> SamplingEngine<'a> {
    pub fn new(
        pool: &'a MicrodataPool,
        scheme: &'a CategoryScheme,
        similarity: &'a SimilarityIndex,
        run_seed: u64,
    ) -> Self {
        Self {
            matcher: RecordMatcher::new(pool, scheme),
            drawer: SampleDrawer::new(similarity),
            run_seed,
        }
    }

    /// Sample every cell of one region. Zero-count cells are skipped.
    pub fn sample_region(&self, region: &RegionId, cells: &[CellTarget]) -> Result<RegionOutcome, SynthError> {
        let mut out = RegionOutcome::default();

        for target in cells.iter().filter(|c| c.count > 0) {
            match self.matcher.match_cell(target) {
                MatchOutcome::Matched { pool, relaxation } => {
                    let drawn = self.drawer.draw_seeded(target, &pool, &relaxation, self.run_seed)?;
                    out.tally(relaxation.to_string(), target.count);
                    out.assignments.extend(drawn);
                }
                MatchOutcome::NoMatch { relaxation } => {
                    warn!(
                        error = %SynthError::NoMatch {
                            geography: target.geography.clone(),
                            combo: target.combo,
                            count: target.count,
                        },
                        "leaving cell unfilled"
                    );
                    out.gaps.push(MatchGap {
                        target: target.clone(),
                        relaxation,
                    });
                }
            }
        }

        debug!(
            region = %region,
            cells = cells.len(),
            households = out.assignments.len(),
            gaps = out.gaps.len(),
            "sampled region"
        );
        Ok(out)
    }

    /// Sample all regions in parallel and merge in region order.
    pub fn sample_regions(
        &self,
        by_region: &BTreeMap<RegionId, Vec<CellTarget>>,
    ) -> Result<RegionOutcome, SynthError> {
        let outcomes: Vec<RegionOutcome> = by_region
            .par_iter()
            .map(|(region, cells)| self.sample_region(region, cells))
            .collect::<Result<_, _>>()?;

        let mut merged = RegionOutcome::default();
        for outcome in outcomes {
            merged.merge(outcome);
        }
        Ok(merged)
    }
}
