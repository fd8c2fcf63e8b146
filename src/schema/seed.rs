//! Seed types: evaluated candidate parameter vectors.

use serde::{Deserialize, Serialize};

/// Value of one parameter in one seed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateValue {
    /// Current numeric value of the parameter.
    pub value: f64,
    /// Width exponent for perturbing this value: `stddev = 0.2^(10^log_width)`.
    pub log_width: f64,
}

impl CandidateValue {
    pub fn new(value: f64, log_width: f64) -> Self {
        Self { value, log_width }
    }
}

/// An evaluated candidate. Created once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    /// Dense ledger index, starting at 0.
    pub index: usize,
    /// One value per dimension, in parameter-space order.
    pub values: Vec<CandidateValue>,
    /// Fitness returned by the scoring function (maximized).
    pub fitness: f64,
}

impl Seed {
    /// Plain parameter values, without perturbation widths.
    pub fn parameters(&self) -> Vec<f64> {
        self.values.iter().map(|v| v.value).collect()
    }
}
