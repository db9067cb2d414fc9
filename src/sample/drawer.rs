//! Draw households (with replacement) from a matched pool.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::warn;

use crate::domain::{CellTarget, MicrodataRecord, RegionId};
use crate::error::SynthError;
use crate::math::cell_seed;
use crate::sample::query::Relaxation;
use crate::sample::similarity::SimilarityIndex;

/// One sampled household placed in a geography.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub geography: String,
    /// Region of the geography the household was drawn for.
    pub region: RegionId,
    pub serial_no: String,
    /// Region the template record came from (differs after state-wide widening).
    pub record_region: RegionId,
    pub relaxation: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SampleDrawer<'a> {
    similarity: &'a SimilarityIndex,
}

impl<'a> SampleDrawer<'a> {
    pub fn new(similarity: &'a SimilarityIndex) -> Self {
        Self { similarity }
    }

    /// Draw `target.count` records with an RNG derived from the cell identity.
    pub fn draw_seeded(
        &self,
        target: &CellTarget,
        pool: &[&MicrodataRecord],
        relaxation: &Relaxation,
        run_seed: u64,
    ) -> Result<Vec<Assignment>, SynthError> {
        let mut rng = StdRng::seed_from_u64(cell_seed(run_seed, "draw", &target.geography, &target.combo));
        self.draw(target, pool, relaxation, &mut rng)
    }

    /// Draw `target.count` records with replacement.
    ///
    /// State-wide pools are weighted by each record's region similarity to the
    /// target region; regional pools are drawn uniformly.
    pub fn draw<R: Rng>(
        &self,
        target: &CellTarget,
        pool: &[&MicrodataRecord],
        relaxation: &Relaxation,
        rng: &mut R,
    ) -> Result<Vec<Assignment>, SynthError> {
        if pool.is_empty() {
            return Err(SynthError::EmptyPoolDraw {
                geography: target.geography.clone(),
                count: target.count,
            });
        }

        let descriptor = relaxation.to_string();
        let weighted = if relaxation.state_wide {
            self.weighted_index(target, pool)
        } else {
            None
        };

        let picks = (0..target.count).map(|_| match &weighted {
            Some(dist) => dist.sample(rng),
            None => rng.gen_range(0..pool.len()),
        });

        Ok(picks
            .map(|idx| {
                let record = pool[idx];
                Assignment {
                    geography: target.geography.clone(),
                    region: target.region.clone(),
                    serial_no: record.serial_no.clone(),
                    record_region: record.region.clone(),
                    relaxation: descriptor.clone(),
                }
            })
            .collect())
    }

    /// Similarity weights for each pooled record; regions absent from the table weigh 0.
    fn weighted_index(&self, target: &CellTarget, pool: &[&MicrodataRecord]) -> Option<WeightedIndex<f64>> {
        let weights: Vec<f64> = pool
            .iter()
            .map(|r| {
                self.similarity
                    .weight(&target.region, &r.region)
                    .filter(|w| w.is_finite() && *w > 0.0)
                    .unwrap_or(0.0)
            })
            .collect();

        match WeightedIndex::new(&weights) {
            Ok(dist) => Some(dist),
            Err(e) => {
                warn!(
                    geography = %target.geography,
                    region = %target.region,
                    error = %e,
                    "no usable similarity weights; drawing uniformly"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Variable;
    use crate::sample::pool::MicrodataPool;
    use crate::sample::query::{EscalationState, Stage};

    fn record(serial: &str, region: &str, combo: [usize; 5]) -> MicrodataRecord {
        MicrodataRecord {
            serial_no: serial.to_string(),
            region: RegionId::new(region),
            combo,
        }
    }

    fn target(count: u32) -> CellTarget {
        CellTarget {
            geography: "G1".to_string(),
            region: RegionId::new("A"),
            combo: [0, 0, 0, 0, 0],
            count,
        }
    }

    fn pool() -> MicrodataPool {
        MicrodataPool::new(vec![
            record("a1", "A", [0, 0, 0, 0, 0]),
            record("a2", "A", [1, 0, 0, 0, 0]),
            record("b1", "B", [0, 0, 0, 0, 0]),
            record("b2", "B", [1, 0, 0, 0, 0]),
            record("c1", "C", [3, 4, 5, 2, 1]),
            record("c2", "C", [3, 4, 5, 2, 1]),
            record("c3", "C", [3, 4, 5, 2, 1]),
        ])
    }

    #[test]
    fn draws_exactly_count_with_replacement() {
        let pool = pool();
        let index = SimilarityIndex::build(&pool, &Variable::ALL, &[]);
        let drawer = SampleDrawer::new(&index);
        let records: Vec<&MicrodataRecord> = pool.records().iter().take(1).collect();

        let out = drawer.draw_seeded(&target(7), &records, &Relaxation::none(), 42).unwrap();
        assert_eq!(out.len(), 7);
        assert!(out.iter().all(|a| a.serial_no == "a1" && a.relaxation == "None."));
    }

    #[test]
    fn empty_pool_is_fatal() {
        let pool = pool();
        let index = SimilarityIndex::build(&pool, &Variable::ALL, &[]);
        let drawer = SampleDrawer::new(&index);
        let err = drawer.draw_seeded(&target(2), &[], &Relaxation::none(), 1).unwrap_err();
        assert!(matches!(err, SynthError::EmptyPoolDraw { count: 2, .. }));
    }

    #[test]
    fn state_wide_draws_avoid_dissimilar_regions() {
        let pool = pool();
        let index = SimilarityIndex::build(&pool, &Variable::ALL, &[]);
        let drawer = SampleDrawer::new(&index);
        // A and B are identical, C is far: w(A,C) = 0.
        let records: Vec<&MicrodataRecord> = pool.records().iter().collect();
        let relaxation = Relaxation::from_state(Stage::StateExact, &EscalationState::default(), true);

        let out = drawer.draw_seeded(&target(200), &records, &relaxation, 3).unwrap();
        assert_eq!(out.len(), 200);
        assert!(out.iter().all(|a| a.record_region != RegionId::new("C")));
        assert!(out.iter().any(|a| a.record_region == RegionId::new("B")));
        assert!(out.iter().all(|a| a.relaxation == "state weights added."));
    }

    #[test]
    fn zero_weights_fall_back_to_uniform() {
        let pool = pool();
        let index = SimilarityIndex::build(&pool, &Variable::ALL, &[]);
        let drawer = SampleDrawer::new(&index);
        let only_c: Vec<&MicrodataRecord> = pool
            .records()
            .iter()
            .filter(|r| r.region == RegionId::new("C"))
            .collect();
        let relaxation = Relaxation::from_state(Stage::StateExact, &EscalationState::default(), true);

        let out = drawer.draw_seeded(&target(5), &only_c, &relaxation, 3).unwrap();
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn seeded_draws_are_reproducible() {
        let pool = pool();
        let index = SimilarityIndex::build(&pool, &Variable::ALL, &[]);
        let drawer = SampleDrawer::new(&index);
        let records: Vec<&MicrodataRecord> = pool.records().iter().collect();
        let a = drawer.draw_seeded(&target(20), &records, &Relaxation::none(), 9).unwrap();
        let b = drawer.draw_seeded(&target(20), &records, &Relaxation::none(), 9).unwrap();
        assert_eq!(a, b);
    }
}
