//! Shared domain types.
//!
//! These types are intentionally kept lightweight so they can be:
//!
//! - shared read-only across rayon workers during fitting and matching
//! - exported to CSV/JSON

use serde::{Deserialize, Serialize};

use crate::domain::labels::{CategoryCombo, Variable};
use crate::error::SynthError;

/// Identifier of a sampling region (PUMA).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(pub String);

impl RegionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One count vector per variable for a single geography.
///
/// Vectors are indexed by category in label order.
#[derive(Debug, Clone, PartialEq)]
pub struct Marginals {
    vectors: [Vec<f64>; Variable::COUNT],
}

impl Marginals {
    /// Build marginals, rejecting negative or non-finite counts.
    pub fn new(vectors: [Vec<f64>; Variable::COUNT]) -> Result<Self, SynthError> {
        for (variable, values) in Variable::ALL.iter().zip(vectors.iter()) {
            if let Some(bad) = values.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
                return Err(SynthError::InvalidInput(format!(
                    "marginal for `{variable}` contains invalid count {bad}"
                )));
            }
        }
        Ok(Self { vectors })
    }

    pub fn get(&self, variable: Variable) -> &[f64] {
        &self.vectors[variable.axis()]
    }

    pub fn vectors(&self) -> &[Vec<f64>; Variable::COUNT] {
        &self.vectors
    }

    /// Population total, taken from the household-size marginal.
    pub fn population(&self) -> f64 {
        self.get(Variable::Size).iter().sum()
    }

    /// Largest absolute difference between any variable's total and the population.
    pub fn total_drift(&self) -> f64 {
        let population = self.population();
        self.vectors
            .iter()
            .map(|v| (v.iter().sum::<f64>() - population).abs())
            .fold(0.0, f64::max)
    }

    pub fn scaled(&self, k: f64) -> Self {
        Self {
            vectors: self
                .vectors
                .clone()
                .map(|v| v.into_iter().map(|x| x * k).collect()),
        }
    }
}

/// A small-area geography (e.g. block group) with its marginal totals.
#[derive(Debug, Clone)]
pub struct Geography {
    pub id: String,
    /// Parent sampling region from the crosswalk (`None` if unmapped).
    pub region: Option<RegionId>,
    pub marginals: Marginals,
}

impl Geography {
    pub fn population(&self) -> f64 {
        self.marginals.population()
    }
}

/// One survey household record used as a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicrodataRecord {
    pub serial_no: String,
    pub region: RegionId,
    pub combo: CategoryCombo,
}

impl MicrodataRecord {
    pub fn category(&self, variable: Variable) -> usize {
        self.combo[variable.axis()]
    }
}

/// A real-valued IPF estimate for one category combination in one geography.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedCell {
    pub geography: String,
    pub combo: CategoryCombo,
    pub estimate: f64,
}

/// A fitted cell after integer rounding (`count > 0`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundedCell {
    pub geography: String,
    pub combo: CategoryCombo,
    pub count: u32,
}

/// A rounded cell routed to matching: `count` households needed in `geography`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellTarget {
    pub geography: String,
    pub region: RegionId,
    pub combo: CategoryCombo,
    pub count: u32,
}
