//! Read-only snapshots of a run for printing and plotting.

use serde::{Deserialize, Serialize};

use super::{CandidateValue, GenerationRecord, RunnerConfig, Seed};

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum RunStatus {
    /// Constructed, nothing sown yet.
    #[default]
    Uninitialized,
    /// Random seeds sown; iterating.
    Running,
    /// Sowing found no viable threshold-to-best gradient.
    Converged,
    /// Iteration limit reached.
    Completed,
}

impl RunStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Converged | Self::Completed)
    }
}

/// Best seed observed when sowing an iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationBest {
    pub iteration: usize,
    pub seed_index: usize,
    pub fitness: f64,
    pub values: Vec<CandidateValue>,
}

impl IterationBest {
    pub fn from_seed(iteration: usize, seed: &Seed) -> Self {
        Self {
            iteration,
            seed_index: seed.index,
            fitness: seed.fitness,
            values: seed.values.clone(),
        }
    }
}

/// Fitness series for plotting.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RunHistory {
    /// Best sown fitness per iteration.
    pub best_fitness: Vec<f64>,
    /// Mean fitness of each generation that produced seeds.
    pub generation_average: Vec<f64>,
    /// Mean fitness of the whole population after each generation.
    pub population_average: Vec<f64>,
}

/// Progress update delivered after every phase boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunProgress {
    /// Completed iterations.
    pub iteration: usize,
    /// Iteration limit.
    pub iteration_limit: usize,
    pub status: RunStatus,
    /// Best fitness in the ledger so far.
    pub best_fitness: Option<f64>,
    /// Seeds evaluated so far.
    pub evaluations: usize,
    /// Seeds added by the latest generation.
    pub generation_size: usize,
}

/// Everything a printer or plotter needs, in one serializable bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub iterations: usize,
    pub config: RunnerConfig,
    pub parameter_names: Vec<String>,
    pub best: Option<Seed>,
    pub iteration_bests: Vec<IterationBest>,
    pub generations: Vec<GenerationRecord>,
    pub generation_fitness: Vec<Vec<f64>>,
    pub history: RunHistory,
}
