//! Deterministic per-cell RNG seeds.
//!
//! Every random decision (probabilistic rounding, record draws) is seeded from
//! the run seed plus the identity of the cell it belongs to, so results do not
//! depend on thread scheduling or on the order cells are processed in.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::domain::CategoryCombo;

/// Seed for one `(purpose, geography, combination)` under `run_seed`.
pub fn cell_seed(run_seed: u64, purpose: &str, geography: &str, combo: &CategoryCombo) -> u64 {
    let mut hasher = DefaultHasher::new();
    run_seed.hash(&mut hasher);
    purpose.hash(&mut hasher);
    geography.hash(&mut hasher);
    combo.hash(&mut hasher);
    hasher.finish()
}
