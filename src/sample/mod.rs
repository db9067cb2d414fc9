//! Household sampling: match each rounded cell to microdata records, escalating
//! through the relaxation ladder, then draw with replacement.

pub mod drawer;
pub mod engine;
pub mod matcher;
pub mod pool;
pub mod query;
pub mod similarity;

pub use drawer::{Assignment, SampleDrawer};
pub use engine::{RegionOutcome, SamplingEngine, StageTally};
pub use matcher::{MatchGap, MatchOutcome, Probe, RecordMatcher, required_pool_size};
pub use pool::MicrodataPool;
pub use query::{Constraint, EscalationState, MatchQuery, Relaxation, Stage};
pub use similarity::SimilarityIndex;
