//! Region-to-region similarity weights for state-wide fallback draws.
//!
//! Each region is profiled by the joint frequency of its microdata records over
//! the profile variables:
//!
//! ```text
//! feature_r = [ count_r(k) / total_r  for each observed combination k ] ++ [ total_r ]
//! d_rs      = ‖feature_r - feature_s‖₂
//! w_rs      = 1 - d_rs / Σ_s' d_rs'
//! ```
//!
//! so `w_rr = 1` and weights fall off with distance. Rows are not normalised to
//! sum to one; they are only used as relative sampling weights.

use std::collections::{BTreeMap, HashMap};

use nalgebra::DMatrix;
use tracing::{debug, warn};

use crate::domain::{RegionId, Variable};
use crate::error::SynthError;
use crate::math::pairwise_euclidean;
use crate::sample::pool::MicrodataPool;

#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    regions: Vec<RegionId>,
    positions: HashMap<RegionId, usize>,
    weights: DMatrix<f64>,
    degenerate: Vec<RegionId>,
}

impl SimilarityIndex {
    /// Build weights for every region present in `pool`.
    ///
    /// `expected` lists regions the caller will sample for; any of them with no
    /// microdata is recorded as degenerate and left out of the table.
    pub fn build(pool: &MicrodataPool, profile: &[Variable], expected: &[RegionId]) -> Self {
        let regions: Vec<RegionId> = pool.regions().cloned().collect();
        let positions: HashMap<RegionId, usize> = regions
            .iter()
            .enumerate()
            .map(|(idx, r)| (r.clone(), idx))
            .collect();

        let mut degenerate: Vec<RegionId> = expected
            .iter()
            .filter(|r| !positions.contains_key(*r))
            .cloned()
            .collect();
        degenerate.sort();
        degenerate.dedup();
        for region in &degenerate {
            warn!(error = %SynthError::DegenerateRegion(region.clone()), "excluding region from similarity table");
        }

        let features = profile_features(pool, &regions, profile);
        let distances = pairwise_euclidean(&features);
        let weights = distances_to_weights(&distances);

        debug!(
            regions = regions.len(),
            features = features.ncols(),
            degenerate = degenerate.len(),
            "built similarity index"
        );

        Self {
            regions,
            positions,
            weights,
            degenerate,
        }
    }

    pub fn regions(&self) -> &[RegionId] {
        &self.regions
    }

    pub fn degenerate(&self) -> &[RegionId] {
        &self.degenerate
    }

    pub fn contains(&self, region: &RegionId) -> bool {
        self.positions.contains_key(region)
    }

    /// Weight of `to` relative to `from`; `None` if either region is absent.
    pub fn weight(&self, from: &RegionId, to: &RegionId) -> Option<f64> {
        let i = *self.positions.get(from)?;
        let j = *self.positions.get(to)?;
        Some(self.weights[(i, j)])
    }

    /// All weights relative to `from`, in `regions()` order.
    pub fn row(&self, from: &RegionId) -> Option<Vec<f64>> {
        let i = *self.positions.get(from)?;
        Some(self.weights.row(i).iter().copied().collect())
    }
}

/// One feature row per region: normalised joint frequencies plus the raw total.
fn profile_features(pool: &MicrodataPool, regions: &[RegionId], profile: &[Variable]) -> DMatrix<f64> {
    let mut columns: BTreeMap<Vec<usize>, usize> = BTreeMap::new();
    let mut counts: Vec<HashMap<Vec<usize>, f64>> = vec![HashMap::new(); regions.len()];

    for (row, region) in regions.iter().enumerate() {
        for record in pool.region_records(region) {
            let key: Vec<usize> = profile.iter().map(|&v| record.category(v)).collect();
            *counts[row].entry(key.clone()).or_insert(0.0) += 1.0;
            columns.entry(key).or_insert(0);
        }
    }
    for (col, slot) in columns.values_mut().enumerate() {
        *slot = col;
    }

    let n_cols = columns.len() + 1;
    let mut features = DMatrix::zeros(regions.len(), n_cols);
    for (row, region_counts) in counts.iter().enumerate() {
        let total: f64 = region_counts.values().sum();
        for (key, &count) in region_counts {
            features[(row, columns[key])] = count / total;
        }
        features[(row, n_cols - 1)] = total;
    }
    features
}

fn distances_to_weights(distances: &DMatrix<f64>) -> DMatrix<f64> {
    let n = distances.nrows();
    let mut weights = DMatrix::from_element(n, n, 1.0);
    for i in 0..n {
        let row_sum: f64 = distances.row(i).sum();
        // All regions identical to this one: every region is equally similar.
        if row_sum <= 0.0 {
            continue;
        }
        for j in 0..n {
            weights[(i, j)] = 1.0 - distances[(i, j)] / row_sum;
        }
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MicrodataRecord;

    fn records(region: &str, combos: &[[usize; 5]]) -> Vec<MicrodataRecord> {
        combos
            .iter()
            .enumerate()
            .map(|(i, &combo)| MicrodataRecord {
                serial_no: format!("{region}-{i}"),
                region: RegionId::new(region),
                combo,
            })
            .collect()
    }

    fn three_region_pool() -> MicrodataPool {
        let mut all = records("A", &[[0, 0, 0, 0, 0], [1, 0, 0, 0, 0], [0, 0, 0, 0, 0]]);
        // B looks like A.
        all.extend(records("B", &[[0, 0, 0, 0, 0], [1, 0, 0, 0, 0], [0, 0, 0, 0, 0]]));
        // C is different in composition and size.
        all.extend(records(
            "C",
            &[[2, 3, 1, 1, 1], [2, 3, 1, 1, 1], [2, 3, 1, 1, 1], [2, 3, 1, 1, 1], [2, 3, 1, 1, 1]],
        ));
        MicrodataPool::new(all)
    }

    #[test]
    fn self_weight_is_row_maximum() {
        let pool = three_region_pool();
        let index = SimilarityIndex::build(&pool, &Variable::ALL, &[]);
        for region in index.regions() {
            let own = index.weight(region, region).unwrap();
            assert!((own - 1.0).abs() < 1e-12);
            for other in index.regions() {
                assert!(index.weight(region, other).unwrap() <= own + 1e-12);
            }
        }
    }

    #[test]
    fn similar_regions_weigh_more() {
        let pool = three_region_pool();
        let index = SimilarityIndex::build(&pool, &Variable::ALL, &[]);
        let a = RegionId::new("A");
        let b = RegionId::new("B");
        let c = RegionId::new("C");
        assert!(index.weight(&a, &b).unwrap() > index.weight(&a, &c).unwrap());
        // Identical profiles: B is as similar to A as A itself.
        assert!((index.weight(&a, &b).unwrap() - 1.0).abs() < 1e-12);
        let row = index.row(&a).unwrap();
        assert_eq!(row.len(), 3);
        assert!(row.iter().sum::<f64>() > 1.0);
    }

    #[test]
    fn regions_without_records_are_degenerate() {
        let pool = three_region_pool();
        let index = SimilarityIndex::build(&pool, &[Variable::Size], &[RegionId::new("A"), RegionId::new("Z")]);
        assert_eq!(index.degenerate(), &[RegionId::new("Z")]);
        assert!(!index.contains(&RegionId::new("Z")));
        assert!(index.weight(&RegionId::new("A"), &RegionId::new("Z")).is_none());
    }

    #[test]
    fn single_region_weights_itself_fully() {
        let pool = MicrodataPool::new(records("A", &[[0, 0, 0, 0, 0]]));
        let index = SimilarityIndex::build(&pool, &Variable::ALL, &[]);
        assert_eq!(index.weight(&RegionId::new("A"), &RegionId::new("A")), Some(1.0));
    }
}
