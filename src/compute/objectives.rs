//! Built-in benchmark objectives.
//!
//! Each objective reads the first two dimensions as `x` and `y`; a missing
//! dimension reads as zero and extra dimensions are ignored.

use std::f64::consts::PI;

use super::propagation::Evaluator;
use crate::schema::{CandidateValue, Objective};

impl Objective {
    /// Fitness at `(x, y)`.
    pub fn score(self, x: f64, y: f64) -> f64 {
        match self {
            Self::CosineRipple => {
                let r2 = (x - 0.5).powi(2) + (y - 0.5).powi(2);
                (9.0 * PI * r2.sqrt()).cos() * (-r2 / 0.15f64.powi(2)).exp()
            }
            Self::TwinGaussian => {
                let wide = (x - 0.5).powi(2) + (y - 0.5).powi(2);
                let narrow = (x - 0.6).powi(2) + (y - 0.1).powi(2);
                0.80 * (-wide / 0.3f64.powi(2)).exp() + 0.88 * (-narrow / 0.03f64.powi(2)).exp()
            }
            Self::RastriginBowl => {
                -3.0 * ((x - 0.5).powi(2) + (y - 0.5).powi(2))
                    - 0.3 * ((6.0 * PI * x).cos() + (6.0 * PI * y).cos())
            }
            Self::RosenbrockValley => -(x - 0.5).powi(2) - (x - y * y).powi(2) + 1.0,
            Self::Paraboloid => 1.0 - x * x / 7.0 - y * y / 2.0,
        }
    }

    /// Location of the global maximum, to within the width of the narrowest peak.
    pub fn optimum(self) -> (f64, f64) {
        match self {
            Self::CosineRipple | Self::RastriginBowl => (0.5, 0.5),
            Self::TwinGaussian => (0.6, 0.1),
            Self::RosenbrockValley => (0.5, 0.5f64.sqrt()),
            Self::Paraboloid => (0.0, 0.0),
        }
    }
}

impl Evaluator for Objective {
    fn evaluate(&self, values: &[CandidateValue]) -> f64 {
        let coord = |i: usize| values.get(i).map_or(0.0, |v| v.value);
        self.score(coord(0), coord(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Objective; 5] = [
        Objective::CosineRipple,
        Objective::TwinGaussian,
        Objective::RastriginBowl,
        Objective::RosenbrockValley,
        Objective::Paraboloid,
    ];

    #[test]
    fn test_optimum_beats_grid() {
        for objective in ALL {
            let (ox, oy) = objective.optimum();
            let best = objective.score(ox, oy);
            for i in 0..=40 {
                for j in 0..=40 {
                    let (x, y) = (i as f64 / 40.0, j as f64 / 40.0);
                    assert!(
                        objective.score(x, y) <= best + 1e-9,
                        "{:?} at ({}, {}) exceeds optimum",
                        objective,
                        x,
                        y
                    );
                }
            }
        }
    }

    #[test]
    fn test_twin_gaussian_local_peak() {
        let objective = Objective::TwinGaussian;
        let local = objective.score(0.5, 0.5);
        assert!(local > objective.score(0.45, 0.5));
        assert!(local < objective.score(0.6, 0.1));
    }

    #[test]
    fn test_evaluator_reads_first_two_dimensions() {
        let values = [
            CandidateValue::new(0.0, 0.0),
            CandidateValue::new(0.0, 0.3),
            CandidateValue::new(9.0, 0.0),
        ];
        assert_eq!(Objective::Paraboloid.evaluate(&values), 1.0);
        assert_eq!(Objective::Paraboloid.evaluate(&values[..1]), 1.0);
    }
}
