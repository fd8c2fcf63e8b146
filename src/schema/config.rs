//! Configuration types for paddy field runs.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{NamedParameter, ParameterConfigError, ParameterSpace};

/// Minimum number of random seeds sown at initialization.
pub const MIN_RANDOM_SEEDS: usize = 5;

/// Which seeds compete during sowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RankingMode {
    /// Every seed ever evaluated.
    #[default]
    Population,
    /// Only the most recently closed generation.
    Generational,
}

impl FromStr for RankingMode {
    type Err = RunnerConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "population" => Ok(Self::Population),
            "generational" => Ok(Self::Generational),
            other => Err(RunnerConfigError::UnknownRankingMode(other.to_string())),
        }
    }
}

/// Algorithm settings for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Seeds sown at random before the first iteration.
    #[serde(default = "default_rand_seed_number")]
    pub rand_seed_number: usize,
    /// Number of top seeds eligible to reproduce (yt).
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    /// Maximum raw offspring quota per seed (Qmax).
    #[serde(default = "default_max_offspring")]
    pub max_offspring: usize,
    /// Neighbor radius for pollination.
    #[serde(default = "default_radius")]
    pub radius: f64,
    /// Ranking scope used by sowing.
    #[serde(default)]
    pub ranking_mode: RankingMode,
    /// Number of sowing iterations to run.
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            rand_seed_number: default_rand_seed_number(),
            threshold: default_threshold(),
            max_offspring: default_max_offspring(),
            radius: default_radius(),
            ranking_mode: RankingMode::default(),
            iterations: default_iterations(),
            random_seed: None,
        }
    }
}

fn default_rand_seed_number() -> usize {
    20
}
fn default_threshold() -> usize {
    10
}
fn default_max_offspring() -> usize {
    10
}
fn default_radius() -> f64 {
    0.2
}
fn default_iterations() -> usize {
    10
}

impl RunnerConfig {
    /// Validate runner configuration.
    pub fn validate(&self) -> Result<(), RunnerConfigError> {
        let counts = [
            ("rand_seed_number", self.rand_seed_number),
            ("threshold", self.threshold),
            ("max_offspring", self.max_offspring),
            ("iterations", self.iterations),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(RunnerConfigError::NonPositive { name, value });
            }
        }

        if !(self.radius.is_finite() && self.radius >= 0.0) {
            return Err(RunnerConfigError::InvalidRadius(self.radius));
        }

        if self.rand_seed_number < MIN_RANDOM_SEEDS {
            return Err(RunnerConfigError::TooFewRandomSeeds(self.rand_seed_number));
        }

        Ok(())
    }
}

/// Runner configuration errors. Raised at construction only.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RunnerConfigError {
    #[error("{name} must be a positive integer, got {value}")]
    NonPositive { name: &'static str, value: usize },
    #[error("Radius must be a non-negative number, got {0}")]
    InvalidRadius(f64),
    #[error("Ranking mode must be 'population' or 'generational', got '{0}'")]
    UnknownRankingMode(String),
    #[error("At least {MIN_RANDOM_SEEDS} random seeds are required, got {0}")]
    TooFewRandomSeeds(usize),
}

/// Built-in benchmark objectives over the first two dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Damped cosine ripple, maximum at (0.5, 0.5).
    CosineRipple,
    /// Two Gaussian peaks, global maximum at (0.6, 0.1), local at (0.5, 0.5).
    #[default]
    TwinGaussian,
    /// Inverted Rastrigin bowl, maximum at (0.5, 0.5) among eight local maxima.
    RastriginBowl,
    /// Inverted Rosenbrock valley, maximum where `x = y^2 = 0.5`.
    RosenbrockValley,
    /// `1 - x^2/7 - y^2/2`, maximum at the origin.
    Paraboloid,
}

/// Complete document consumed by the `paddy` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Algorithm settings.
    #[serde(default)]
    pub runner: RunnerConfig,
    /// Optimized dimensions, in order.
    pub parameters: Vec<NamedParameter>,
    /// Objective to maximize.
    #[serde(default)]
    pub objective: Objective,
    /// Primary checkpoint path; the backup sits beside it.
    #[serde(default)]
    pub checkpoint: Option<PathBuf>,
    /// Compress checkpoint payloads (requires the `lz4` feature).
    #[serde(default)]
    pub compress_checkpoints: bool,
    /// Evaluation workers (0 or 1 = evaluate sequentially).
    #[serde(default)]
    pub workers: usize,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        let unit = super::ParameterSpec::builder(0.0, 1.0, 0.1)
            .limits(0.0, 1.0)
            .scaled()
            .normalized()
            .build();
        let parameters = match unit {
            Ok(spec) => ["x", "y"]
                .into_iter()
                .map(|name| NamedParameter {
                    name: name.to_string(),
                    spec: spec.clone(),
                })
                .collect(),
            Err(_) => Vec::new(),
        };

        Self {
            runner: RunnerConfig::default(),
            parameters,
            objective: Objective::default(),
            checkpoint: None,
            compress_checkpoints: false,
            workers: 0,
        }
    }
}

impl OptimizationConfig {
    /// Validate and build the ordered parameter space.
    pub fn parameter_space(&self) -> Result<ParameterSpace, ParameterConfigError> {
        ParameterSpace::new(self.parameters.clone())
    }
}
