//! Adaptive record matching for one rounded cell.
//!
//! The ladder, stopping at the first probe whose pool reaches the required size:
//!
//! 1. exact match on all five variables within the cell's region
//! 2. exact match state-wide
//! 3. expand size, then age, then income to their three-category neighbourhood;
//!    after each expansion probe the region, then state-wide
//! 4. on top of all expansions, eliminate ethnicity, then age, then income;
//!    after each elimination probe the region, then state-wide
//! 5. otherwise the cell is a gap (`NoMatch`)

use crate::domain::{CategoryScheme, CellTarget, MicrodataRecord, Variable};
use crate::sample::pool::MicrodataPool;
use crate::sample::query::{
    ELIMINATION_ORDER, EXPANSION_ORDER, EscalationState, MatchQuery, Relaxation, Stage,
};

/// Minimum pool size before a cell of `count` households is sampled.
///
/// Small targets tolerate thin pools; larger ones need more distinct records to
/// avoid drawing the same household over and over.
pub fn required_pool_size(count: u32) -> usize {
    match count {
        0..=10 => 1,
        11..=15 => 2,
        16..=20 => 3,
        21..=25 => 4,
        _ => 5,
    }
}

/// Pool size observed at one probe of the ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub relaxation: Relaxation,
    pub pool_size: usize,
}

#[derive(Debug, Clone)]
pub enum MatchOutcome<'a> {
    Matched {
        pool: Vec<&'a MicrodataRecord>,
        relaxation: Relaxation,
    },
    /// Ladder exhausted; `relaxation` describes the loosest query tried.
    NoMatch { relaxation: Relaxation },
}

/// A cell the ladder could not fill, kept for gap reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchGap {
    pub target: CellTarget,
    pub relaxation: Relaxation,
}

#[derive(Debug, Clone, Copy)]
pub struct RecordMatcher<'a> {
    pool: &'a MicrodataPool,
    scheme: &'a CategoryScheme,
}

impl<'a> RecordMatcher<'a> {
    pub fn new(pool: &'a MicrodataPool, scheme: &'a CategoryScheme) -> Self {
        Self { pool, scheme }
    }

    pub fn match_cell(&self, target: &CellTarget) -> MatchOutcome<'a> {
        let required = required_pool_size(target.count);
        let mut last = Relaxation::none();

        for (query, relaxation) in self.ladder(target) {
            let pool = self.pool.select(&query);
            tracing::trace!(
                geography = %target.geography,
                probe = %relaxation,
                pool = pool.len(),
                required,
                "match probe"
            );
            if pool.len() >= required {
                return MatchOutcome::Matched { pool, relaxation };
            }
            last = relaxation;
        }

        MatchOutcome::NoMatch { relaxation: last }
    }

    /// Pool size at every probe of the ladder, without stopping early.
    pub fn trace(&self, target: &CellTarget) -> Vec<Probe> {
        self.ladder(target)
            .map(|(query, relaxation)| Probe {
                pool_size: self.pool.select(&query).len(),
                relaxation,
            })
            .collect()
    }

    /// Probes in ladder order, built only as they are pulled.
    fn ladder<'t>(&self, target: &'t CellTarget) -> impl Iterator<Item = (MatchQuery, Relaxation)> + 't
    where
        'a: 't,
    {
        let scheme = self.scheme;
        let combo = target.combo;
        let region = &target.region;

        std::iter::once(Step::Exact)
            .chain(EXPANSION_ORDER.into_iter().map(Step::Expand))
            .chain(ELIMINATION_ORDER.into_iter().map(Step::Eliminate))
            .scan(EscalationState::default(), move |state, step| {
                let stage = match step {
                    Step::Exact => Stage::Exact,
                    Step::Expand(variable) => {
                        let candidates = scheme.get(variable).expand(combo[variable.axis()]);
                        *state = state.with_expanded(variable, candidates);
                        Stage::Expanded
                    }
                    Step::Eliminate(variable) => {
                        *state = state.with_eliminated(variable);
                        Stage::Eliminated
                    }
                };
                Some((stage, state.clone()))
            })
            .flat_map(move |(stage, state)| {
                // The state-wide exact probe is its own stage, not an expansion.
                let state_stage = if stage == Stage::Exact { Stage::StateExact } else { stage };
                [(stage, false), (state_stage, true)]
                    .into_iter()
                    .map(move |(stage, state_wide)| {
                        let scope = (!state_wide).then(|| region.clone());
                        (
                            state.query(&combo, scope),
                            Relaxation::from_state(stage, &state, state_wide),
                        )
                    })
            })
    }
}

/// One rung of escalation; each rung is probed in the region, then state-wide.
#[derive(Debug, Clone, Copy)]
enum Step {
    Exact,
    Expand(Variable),
    Eliminate(Variable),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RegionId;

    fn record(serial: &str, region: &str, combo: [usize; 5]) -> MicrodataRecord {
        MicrodataRecord {
            serial_no: serial.to_string(),
            region: RegionId::new(region),
            combo,
        }
    }

    fn target(combo: [usize; 5], count: u32) -> CellTarget {
        CellTarget {
            geography: "G1".to_string(),
            region: RegionId::new("P1"),
            combo,
            count,
        }
    }

    #[test]
    fn pool_size_steps() {
        assert_eq!(required_pool_size(1), 1);
        assert_eq!(required_pool_size(10), 1);
        assert_eq!(required_pool_size(11), 2);
        assert_eq!(required_pool_size(15), 2);
        assert_eq!(required_pool_size(20), 3);
        assert_eq!(required_pool_size(25), 4);
        assert_eq!(required_pool_size(26), 5);
        assert_eq!(required_pool_size(10_000), 5);
    }

    #[test]
    fn exact_regional_match_needs_no_relaxation() {
        let scheme = CategoryScheme::default();
        let pool = MicrodataPool::new(vec![record("a", "P1", [2, 2, 2, 0, 1])]);
        let matcher = RecordMatcher::new(&pool, &scheme);
        match matcher.match_cell(&target([2, 2, 2, 0, 1], 3)) {
            MatchOutcome::Matched { pool, relaxation } => {
                assert_eq!(pool.len(), 1);
                assert_eq!(relaxation, Relaxation::none());
                assert_eq!(relaxation.to_string(), "None.");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn state_wide_exact_probe_comes_second() {
        let scheme = CategoryScheme::default();
        let pool = MicrodataPool::new(vec![record("a", "P2", [2, 2, 2, 0, 1])]);
        let matcher = RecordMatcher::new(&pool, &scheme);
        match matcher.match_cell(&target([2, 2, 2, 0, 1], 3)) {
            MatchOutcome::Matched { relaxation, .. } => {
                assert_eq!(relaxation.stage, Stage::StateExact);
                assert!(relaxation.state_wide);
                assert_eq!(relaxation.to_string(), "state weights added.");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn larger_counts_need_deeper_pools() {
        let scheme = CategoryScheme::default();
        let pool = MicrodataPool::new(vec![
            record("a", "P1", [2, 2, 2, 0, 1]),
            record("b", "P1", [3, 2, 2, 0, 1]),
        ]);
        let matcher = RecordMatcher::new(&pool, &scheme);
        // count 12 needs two records: the exact probes find one, the size expansion two.
        match matcher.match_cell(&target([2, 2, 2, 0, 1], 12)) {
            MatchOutcome::Matched { pool, relaxation } => {
                assert_eq!(pool.len(), 2);
                assert_eq!(relaxation.expanded, vec![Variable::Size]);
                assert!(!relaxation.state_wide);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn eliminations_stack_on_expansions() {
        let scheme = CategoryScheme::default();
        // Only differs in ethnicity and is far away in age.
        let pool = MicrodataPool::new(vec![record("a", "P1", [2, 6, 2, 0, 0])]);
        let matcher = RecordMatcher::new(&pool, &scheme);
        match matcher.match_cell(&target([2, 0, 2, 0, 1], 1)) {
            MatchOutcome::Matched { relaxation, .. } => {
                assert_eq!(relaxation.stage, Stage::Eliminated);
                assert_eq!(relaxation.eliminated, vec![Variable::Ethnicity, Variable::Age]);
                assert_eq!(
                    relaxation.expanded,
                    vec![Variable::Size, Variable::Age, Variable::Income]
                );
                assert!(!relaxation.state_wide);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn exhausted_ladder_is_no_match() {
        let scheme = CategoryScheme::default();
        // Race never matches, and race is never relaxed.
        let pool = MicrodataPool::new(vec![record("a", "P1", [2, 2, 2, 1, 1])]);
        let matcher = RecordMatcher::new(&pool, &scheme);
        match matcher.match_cell(&target([2, 2, 2, 0, 1], 1)) {
            MatchOutcome::NoMatch { relaxation } => {
                assert_eq!(
                    relaxation.eliminated,
                    vec![Variable::Ethnicity, Variable::Age, Variable::Income]
                );
                assert!(relaxation.state_wide);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn trace_covers_every_probe() {
        let scheme = CategoryScheme::default();
        let pool = MicrodataPool::new(vec![record("a", "P1", [2, 2, 2, 0, 1])]);
        let matcher = RecordMatcher::new(&pool, &scheme);
        let probes = matcher.trace(&target([2, 2, 2, 0, 1], 1));
        assert_eq!(probes.len(), 14);
        assert!(probes.iter().all(|p| p.pool_size == 1));
        assert_eq!(probes[0].relaxation.stage, Stage::Exact);
        assert_eq!(probes[1].relaxation.stage, Stage::StateExact);
        assert_eq!(probes[13].relaxation.stage, Stage::Eliminated);
    }

    #[test]
    fn ladder_tries_region_then_state_per_rung() {
        let scheme = CategoryScheme::default();
        let pool = MicrodataPool::default();
        let matcher = RecordMatcher::new(&pool, &scheme);
        let t = target([2, 2, 2, 0, 1], 1);

        let (first, relaxation) = matcher.ladder(&t).next().unwrap();
        assert_eq!(first.region(), Some(&RegionId::new("P1")));
        assert_eq!(relaxation, Relaxation::none());

        let probes: Vec<(MatchQuery, Relaxation)> = matcher.ladder(&t).collect();
        assert_eq!(probes.len(), 14);
        for pair in probes.chunks(2) {
            assert!(pair[0].0.region().is_some() && !pair[0].1.state_wide);
            assert!(pair[1].0.region().is_none() && pair[1].1.state_wide);
            assert_eq!(pair[0].1.expanded, pair[1].1.expanded);
            assert_eq!(pair[0].1.eliminated, pair[1].1.eliminated);
        }
        assert_eq!(probes[7].1.expanded, vec![Variable::Size, Variable::Age, Variable::Income]);
        assert_eq!(probes[13].1.eliminated, vec![Variable::Ethnicity, Variable::Age, Variable::Income]);
    }
}
