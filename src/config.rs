//! Run configuration with layered resolution.
//!
//! Resolution order (highest priority first):
//! 1. CLI flags (applied via `apply_cli_overrides`)
//! 2. Environment variables (`SYNTHPOP_SEED`, `SYNTHPOP_THREADS`)
//! 3. TOML config file (`--config`)
//! 4. Compiled defaults

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{
    CategoryScheme, Variable, DEFAULT_AGE_LABELS, DEFAULT_ETHNICITY_LABELS, DEFAULT_INCOME_LABELS,
    DEFAULT_RACE_LABELS, DEFAULT_SIZE_LABELS,
};
use crate::error::SynthError;
use crate::fit::{RoundingKind, RoundingRule};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Worker threads for fitting and matching (`0` = rayon default).
    pub threads: usize,
    /// Run seed; every cell derives its own RNG from it.
    pub seed: u64,
    pub labels: LabelsConfig,
    pub ipf: IpfConfig,
    pub rounding: RoundingConfig,
    pub similarity: SimilarityConfig,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            seed: 42,
            labels: LabelsConfig::default(),
            ipf: IpfConfig::default(),
            rounding: RoundingConfig::default(),
            similarity: SimilarityConfig::default(),
        }
    }
}

/// Ordered category labels per variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelsConfig {
    pub size: Vec<String>,
    pub age: Vec<String>,
    pub income: Vec<String>,
    pub race: Vec<String>,
    pub ethnicity: Vec<String>,
}

impl Default for LabelsConfig {
    fn default() -> Self {
        let owned = |labels: &[&str]| labels.iter().map(|s| s.to_string()).collect();
        Self {
            size: owned(&DEFAULT_SIZE_LABELS),
            age: owned(&DEFAULT_AGE_LABELS),
            income: owned(&DEFAULT_INCOME_LABELS),
            race: owned(&DEFAULT_RACE_LABELS),
            ethnicity: owned(&DEFAULT_ETHNICITY_LABELS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpfConfig {
    pub max_iterations: usize,
    /// Convergence threshold on the max per-cell relative change between passes.
    pub tolerance: f64,
    /// Keep fits that hit `max_iterations` (they are still counted as failures).
    pub allow_unconverged: bool,
}

impl Default for IpfConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-6,
            allow_unconverged: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundingConfig {
    pub rule: RoundingKind,
    /// Added before rounding when `rule = "offset"`.
    pub offset: f64,
}

impl Default for RoundingConfig {
    fn default() -> Self {
        Self {
            rule: RoundingKind::Offset,
            offset: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Variables whose joint distribution profiles each region.
    pub profile: Vec<Variable>,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            profile: Variable::ALL.to_vec(),
        }
    }
}

/// CLI override arguments that can be applied to a config.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub seed: Option<u64>,
    pub threads: Option<usize>,
    pub rounding: Option<RoundingKind>,
}

impl SynthConfig {
    /// Load configuration: defaults, then `path` (if any), then env, then CLI.
    pub fn load(path: Option<&Path>, cli: &CliOverrides) -> Result<Self, SynthError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    SynthError::Config(format!("failed to read '{}': {e}", path.display()))
                })?;
                Self::from_toml(&text).map_err(|e| match e {
                    SynthError::Config(msg) => {
                        SynthError::Config(format!("{}: {msg}", path.display()))
                    }
                    other => other,
                })?
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (no validation).
    pub fn from_toml(text: &str) -> Result<Self, SynthError> {
        toml::from_str(text).map_err(|e| SynthError::Config(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let Some(seed) = std::env::var("SYNTHPOP_SEED").ok().and_then(|v| v.parse().ok()) {
            self.seed = seed;
        }
        if let Some(threads) = std::env::var("SYNTHPOP_THREADS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.threads = threads;
        }
    }

    pub fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        if let Some(seed) = cli.seed {
            self.seed = seed;
        }
        if let Some(threads) = cli.threads {
            self.threads = threads;
        }
        if let Some(rule) = cli.rounding {
            self.rounding.rule = rule;
        }
    }

    pub fn validate(&self) -> Result<(), SynthError> {
        self.scheme()?;

        if self.ipf.max_iterations == 0 {
            return Err(SynthError::Config("ipf.max_iterations must be >= 1".to_string()));
        }
        if !(self.ipf.tolerance.is_finite() && self.ipf.tolerance > 0.0) {
            return Err(SynthError::Config("ipf.tolerance must be finite and > 0".to_string()));
        }
        if !(0.0..0.5).contains(&self.rounding.offset) {
            return Err(SynthError::Config("rounding.offset must be in [0, 0.5)".to_string()));
        }
        if self.similarity.profile.is_empty() {
            return Err(SynthError::Config("similarity.profile must not be empty".to_string()));
        }
        let mut seen = Vec::with_capacity(self.similarity.profile.len());
        for variable in &self.similarity.profile {
            if seen.contains(variable) {
                return Err(SynthError::Config(format!(
                    "similarity.profile lists `{variable}` twice"
                )));
            }
            seen.push(*variable);
        }
        Ok(())
    }

    pub fn scheme(&self) -> Result<CategoryScheme, SynthError> {
        CategoryScheme::from_labels([
            self.labels.size.clone(),
            self.labels.age.clone(),
            self.labels.income.clone(),
            self.labels.race.clone(),
            self.labels.ethnicity.clone(),
        ])
    }

    pub fn rounding_rule(&self) -> RoundingRule {
        RoundingRule::from_kind(self.rounding.rule, self.rounding.offset)
    }
}
