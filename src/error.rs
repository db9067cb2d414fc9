//! Error types.
//!
//! - `SynthError` covers the fitting/matching taxonomy and is what library code returns.
//! - `AppError` is the binary boundary: a message plus the process exit code.
//!
//! Exit codes: `2` invalid input/config/IO, `3` insufficient data, `4` internal fault.

use crate::domain::{CategoryCombo, RegionId};

/// Failures raised by the estimation and matching core.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SynthError {
    #[error("shape mismatch on axis {axis}: expected {expected} categories, got {actual}")]
    ShapeMismatch {
        axis: usize,
        expected: usize,
        actual: usize,
    },

    #[error("IPF did not converge after {iterations} iterations (max relative change {max_change:.3e})")]
    ConvergenceFailure { iterations: usize, max_change: f64 },

    #[error("region {0} has no microdata records")]
    DegenerateRegion(RegionId),

    #[error("no microdata pool for geography {geography} combination {combo:?} (count {count})")]
    NoMatch {
        geography: String,
        combo: CategoryCombo,
        count: u32,
    },

    #[error("attempted to draw {count} records from an empty pool for geography {geography}")]
    EmptyPoolDraw { geography: String, count: u32 },

    #[error("nothing to synthesize: {0}")]
    InsufficientData(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SynthError {
    pub fn exit_code(&self) -> u8 {
        match self {
            SynthError::ShapeMismatch { .. }
            | SynthError::InvalidInput(_)
            | SynthError::Config(_) => 2,
            SynthError::DegenerateRegion(_)
            | SynthError::NoMatch { .. }
            | SynthError::InsufficientData(_) => 3,
            SynthError::ConvergenceFailure { .. } | SynthError::EmptyPoolDraw { .. } => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<SynthError> for AppError {
    fn from(err: SynthError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synth_errors_map_to_exit_codes() {
        let shape: AppError = SynthError::ShapeMismatch {
            axis: 1,
            expected: 7,
            actual: 6,
        }
        .into();
        assert_eq!(shape.exit_code(), 2);
        assert!(shape.to_string().contains("axis 1"));

        let empty: AppError = SynthError::EmptyPoolDraw {
            geography: "G1".to_string(),
            count: 3,
        }
        .into();
        assert_eq!(empty.exit_code(), 4);
    }
}
