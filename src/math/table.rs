//! Dense row-major N-dimensional table of real-valued counts.
//!
//! IPF only ever needs three operations on the joint table:
//!
//! ```text
//! project(axis)          -> Σ over every other axis
//! scale_axis(axis, f)    -> cell *= f[index along axis]
//! max_relative_change    -> convergence test between passes
//! ```
//!
//! Storage is a flat `Vec<f64>` plus row-major strides.

use crate::error::SynthError;

#[derive(Debug, Clone, PartialEq)]
pub struct JointTable {
    shape: Vec<usize>,
    strides: Vec<usize>,
    data: Vec<f64>,
}

impl JointTable {
    /// A table of the given shape with every cell set to `value`.
    pub fn filled(shape: &[usize], value: f64) -> Self {
        let len = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            strides: strides_for(shape),
            data: vec![value; len],
        }
    }

    pub fn from_vec(shape: &[usize], data: Vec<f64>) -> Result<Self, SynthError> {
        let len: usize = shape.iter().product();
        if data.len() != len {
            return Err(SynthError::InvalidInput(format!(
                "table data has {} cells but shape {shape:?} needs {len}",
                data.len()
            )));
        }
        Ok(Self {
            shape: shape.to_vec(),
            strides: strides_for(shape),
            data,
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, index: &[usize]) -> f64 {
        self.data[self.offset(index)]
    }

    pub fn offset(&self, index: &[usize]) -> usize {
        debug_assert_eq!(index.len(), self.shape.len());
        index
            .iter()
            .zip(self.strides.iter())
            .map(|(i, s)| i * s)
            .sum()
    }

    /// Multi-index of a flat offset.
    pub fn unravel(&self, offset: usize) -> Vec<usize> {
        self.strides
            .iter()
            .zip(self.shape.iter())
            .map(|(&stride, &dim)| (offset / stride) % dim)
            .collect()
    }

    pub fn total(&self) -> f64 {
        self.data.iter().sum()
    }

    /// Sum of all cells sharing each index along `axis`.
    pub fn project(&self, axis: usize) -> Vec<f64> {
        let stride = self.strides[axis];
        let dim = self.shape[axis];
        let mut out = vec![0.0; dim];
        for (offset, value) in self.data.iter().enumerate() {
            out[(offset / stride) % dim] += value;
        }
        out
    }

    /// Multiply every cell by the factor of its index along `axis`.
    pub fn scale_axis(&mut self, axis: usize, factors: &[f64]) {
        debug_assert_eq!(factors.len(), self.shape[axis]);
        let stride = self.strides[axis];
        let dim = self.shape[axis];
        for (offset, value) in self.data.iter_mut().enumerate() {
            *value *= factors[(offset / stride) % dim];
        }
    }

    pub fn scaled(&self, k: f64) -> Self {
        Self {
            shape: self.shape.clone(),
            strides: self.strides.clone(),
            data: self.data.iter().map(|v| v * k).collect(),
        }
    }

    /// Largest per-cell relative change from `previous` to `self`.
    ///
    /// `0/0` counts as no change; growth from an exact zero is infinite.
    pub fn max_relative_change(&self, previous: &JointTable) -> f64 {
        debug_assert_eq!(self.shape, previous.shape);
        self.data
            .iter()
            .zip(previous.data.iter())
            .map(|(&new, &old)| {
                if old > 0.0 {
                    (new - old).abs() / old
                } else if new == 0.0 {
                    0.0
                } else {
                    f64::INFINITY
                }
            })
            .fold(0.0, f64::max)
    }

    /// `(multi-index, value)` for every cell in row-major order.
    pub fn iter_indexed(&self) -> impl Iterator<Item = (Vec<usize>, f64)> + '_ {
        self.data
            .iter()
            .enumerate()
            .map(|(offset, &value)| (self.unravel(offset), value))
    }
}

fn strides_for(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}
