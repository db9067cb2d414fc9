//! Iterative proportional fitting (raking).
//!
//! Given:
//! - a positive seed table over the full category cross-product
//! - one 1-D marginal vector per constrained axis
//!
//! we repeatedly rescale the working table along each constrained axis so its
//! projection matches the target marginal:
//!
//! ```text
//! cell *= target[i] / projection[i]     (0 when projection[i] == 0)
//! ```
//!
//! One sweep over every constraint is one iteration. We stop once the max
//! per-cell relative change between successive iterations drops below the
//! tolerance, or report non-convergence at the iteration cap.

use rayon::prelude::*;
use tracing::debug;

use crate::config::IpfConfig;
use crate::domain::{CategoryScheme, FittedCell, Geography, Variable};
use crate::error::SynthError;
use crate::math::JointTable;

#[derive(Debug, Clone)]
pub struct IpfFitter {
    max_iterations: usize,
    tolerance: f64,
}

/// Fitted table plus convergence diagnostics.
#[derive(Debug, Clone)]
pub struct IpfFit {
    pub table: JointTable,
    pub iterations: usize,
    /// Max relative change observed on the last iteration.
    pub max_change: f64,
    pub converged: bool,
}

/// IPF output for one geography, flattened to its non-zero cells.
#[derive(Debug, Clone)]
pub struct GeographyFit {
    pub geography: String,
    pub cells: Vec<FittedCell>,
    pub iterations: usize,
    pub max_change: f64,
    pub converged: bool,
}

impl GeographyFit {
    pub fn estimated_total(&self) -> f64 {
        self.cells.iter().map(|c| c.estimate).sum()
    }
}

impl IpfFitter {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations: max_iterations.max(1),
            tolerance,
        }
    }

    pub fn from_config(config: &IpfConfig) -> Self {
        Self::new(config.max_iterations, config.tolerance)
    }

    /// Fit and fail with `ConvergenceFailure` if the tolerance is not reached.
    pub fn fit(
        &self,
        seed: &JointTable,
        marginals: &[Vec<f64>],
        dims: &[usize],
    ) -> Result<JointTable, SynthError> {
        let fit = self.fit_with_report(seed, marginals, dims)?;
        if !fit.converged {
            return Err(SynthError::ConvergenceFailure {
                iterations: fit.iterations,
                max_change: fit.max_change,
            });
        }
        Ok(fit.table)
    }

    /// Fit and return the table even when the iteration cap is hit.
    ///
    /// `dims[k]` is the table axis constrained by `marginals[k]`.
    pub fn fit_with_report(
        &self,
        seed: &JointTable,
        marginals: &[Vec<f64>],
        dims: &[usize],
    ) -> Result<IpfFit, SynthError> {
        validate_inputs(seed, marginals, dims)?;

        let mut table = seed.clone();
        let mut max_change = f64::INFINITY;

        for iteration in 1..=self.max_iterations {
            let previous = table.clone();
            rake_once(&mut table, marginals, dims);
            max_change = table.max_relative_change(&previous);

            if max_change < self.tolerance {
                return Ok(IpfFit {
                    table,
                    iterations: iteration,
                    max_change,
                    converged: true,
                });
            }
        }

        Ok(IpfFit {
            table,
            iterations: self.max_iterations,
            max_change,
            converged: false,
        })
    }

    /// Fit one geography over the five-variable cross-product from a ones seed.
    pub fn fit_geography(
        &self,
        geography: &Geography,
        scheme: &CategoryScheme,
    ) -> Result<GeographyFit, SynthError> {
        let seed = JointTable::filled(&scheme.shape(), 1.0);
        let dims: Vec<usize> = Variable::ALL.iter().map(|v| v.axis()).collect();
        let fit = self.fit_with_report(&seed, geography.marginals.vectors(), &dims)?;

        let cells = fit
            .table
            .iter_indexed()
            .filter(|(_, estimate)| *estimate > 0.0)
            .map(|(index, estimate)| FittedCell {
                geography: geography.id.clone(),
                combo: [index[0], index[1], index[2], index[3], index[4]],
                estimate,
            })
            .collect();

        debug!(
            geography = %geography.id,
            iterations = fit.iterations,
            max_change = fit.max_change,
            converged = fit.converged,
            "fitted geography"
        );

        Ok(GeographyFit {
            geography: geography.id.clone(),
            cells,
            iterations: fit.iterations,
            max_change: fit.max_change,
            converged: fit.converged,
        })
    }

    /// Fit every geography in parallel; results keep the input order.
    pub fn fit_geographies(
        &self,
        geographies: &[Geography],
        scheme: &CategoryScheme,
    ) -> Vec<Result<GeographyFit, SynthError>> {
        geographies
            .par_iter()
            .map(|geo| self.fit_geography(geo, scheme))
            .collect()
    }
}

fn rake_once(table: &mut JointTable, marginals: &[Vec<f64>], dims: &[usize]) {
    for (target, &axis) in marginals.iter().zip(dims.iter()) {
        let current = table.project(axis);
        let factors: Vec<f64> = target
            .iter()
            .zip(current.iter())
            .map(|(&t, &c)| if c > 0.0 { t / c } else { 0.0 })
            .collect();
        table.scale_axis(axis, &factors);
    }
}

fn validate_inputs(seed: &JointTable, marginals: &[Vec<f64>], dims: &[usize]) -> Result<(), SynthError> {
    if marginals.len() != dims.len() {
        return Err(SynthError::InvalidInput(format!(
            "{} marginals but {} dimension assignments",
            marginals.len(),
            dims.len()
        )));
    }

    for (marginal, &axis) in marginals.iter().zip(dims.iter()) {
        if axis >= seed.ndim() {
            return Err(SynthError::InvalidInput(format!(
                "marginal constrains axis {axis} but the table has {} axes",
                seed.ndim()
            )));
        }
        let expected = seed.shape()[axis];
        if marginal.len() != expected {
            return Err(SynthError::ShapeMismatch {
                axis,
                expected,
                actual: marginal.len(),
            });
        }
        if let Some(bad) = marginal.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
            return Err(SynthError::InvalidInput(format!(
                "marginal on axis {axis} contains invalid count {bad}"
            )));
        }
    }

    if let Some(bad) = seed.data().iter().find(|v| !(v.is_finite() && **v > 0.0)) {
        return Err(SynthError::InvalidInput(format!(
            "seed table must be strictly positive, found {bad}"
        )));
    }

    Ok(())
}
