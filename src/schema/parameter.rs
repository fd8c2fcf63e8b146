//! Parameter model: per-dimension sampling domain, bounds and perturbation.
//!
//! A [`ParameterSpec`] describes one optimized dimension. It knows how to draw
//! a random starting value, how to perturb a parent value into an offspring
//! value, and how to map values into the unit interval for distance
//! computations. A [`ParameterSpace`] is the ordered collection of named
//! specs that defines dimension identity and order for a run.

use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::CandidateValue;

/// Base of the perturbation width: `stddev = WIDTH_BASE ^ (10 ^ log_width)`.
pub const WIDTH_BASE: f64 = 0.2;

/// Standard deviation used when the perturbation width itself mutates.
pub const LOG_WIDTH_STDDEV: f64 = 0.2;

/// Numeric kind of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    /// Values are rounded to the nearest integer.
    Integer,
    /// Values are kept as real numbers.
    #[default]
    Continuous,
}

impl FromStr for ParameterKind {
    type Err = ParameterConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "integer" => Ok(Self::Integer),
            "continuous" => Ok(Self::Continuous),
            other => Err(ParameterConfigError::UnknownKind(other.to_string())),
        }
    }
}

/// Whether the perturbation width of a value evolves across generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PerturbationMode {
    /// Width exponent stays at zero (stddev 0.2).
    #[default]
    #[serde(alias = "default")]
    Fixed,
    /// Width exponent is itself perturbed with every offspring.
    Scaled,
}

impl FromStr for PerturbationMode {
    type Err = ParameterConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" | "default" => Ok(Self::Fixed),
            "scaled" => Ok(Self::Scaled),
            other => Err(ParameterConfigError::UnknownPerturbation(other.to_string())),
        }
    }
}

/// Largest number of steps a sampling grid may span.
const MAX_GRID_STEPS: f64 = u32::MAX as f64;

/// Sampling domain `{min, min + step, ..., max}` for random initialization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl ValueRange {
    pub fn new(min: f64, max: f64, step: f64) -> Self {
        Self { min, max, step }
    }

    /// Number of points in the discretized domain, including a trailing
    /// `max` when the span is not a whole number of steps.
    pub fn point_count(&self) -> usize {
        let (whole, has_remainder) = self.steps();
        whole + 1 + usize::from(has_remainder)
    }

    /// Value of the `i`-th grid point.
    pub fn point(&self, i: usize) -> f64 {
        let (whole, _) = self.steps();
        if i > whole {
            self.max
        } else {
            (self.min + i as f64 * self.step).min(self.max)
        }
    }

    fn steps(&self) -> (usize, bool) {
        let span = self.max - self.min;
        if span <= 0.0 {
            return (0, false);
        }
        let ratio = span / self.step;
        // Snap ratios that are a rounding error away from a whole number.
        let nearest = ratio.round();
        if (ratio - nearest).abs() < 1e-9 * nearest.max(1.0) {
            (nearest as usize, false)
        } else {
            (ratio.floor() as usize, true)
        }
    }
}

/// Hard bounds on a parameter value. Either end may be infinite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub lo: f64,
    pub hi: f64,
}

impl Limits {
    pub fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    pub fn unbounded() -> Self {
        Self {
            lo: f64::NEG_INFINITY,
            hi: f64::INFINITY,
        }
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.lo.is_finite() && self.hi.is_finite()
    }

    #[inline]
    pub fn clip(&self, value: f64) -> f64 {
        value.clamp(self.lo, self.hi)
    }
}

/// Configuration of a single optimized dimension.
///
/// Immutable once built; construct through [`ParameterSpec::new`] or
/// [`ParameterSpec::builder`] so the invariants are checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    range: ValueRange,
    #[serde(default)]
    kind: ParameterKind,
    #[serde(default)]
    limits: Option<Limits>,
    #[serde(default)]
    perturbation: PerturbationMode,
    #[serde(default)]
    normalize: bool,
}

impl ParameterSpec {
    /// Create a validated parameter spec.
    pub fn new(
        range: ValueRange,
        kind: ParameterKind,
        limits: Option<Limits>,
        perturbation: PerturbationMode,
        normalize: bool,
    ) -> Result<Self, ParameterConfigError> {
        let spec = Self {
            range,
            kind,
            limits,
            perturbation,
            normalize,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Start a builder for a continuous, unbounded, fixed-width parameter.
    pub fn builder(min: f64, max: f64, step: f64) -> ParameterSpecBuilder {
        ParameterSpecBuilder {
            range: ValueRange::new(min, max, step),
            kind: ParameterKind::Continuous,
            limits: None,
            perturbation: PerturbationMode::Fixed,
            normalize: false,
        }
    }

    /// Check the construction invariants.
    ///
    /// Deserialized specs bypass [`ParameterSpec::new`], so loaders call this.
    pub fn validate(&self) -> Result<(), ParameterConfigError> {
        let ValueRange { min, max, step } = self.range;
        if min > max || min.is_nan() || max.is_nan() {
            return Err(ParameterConfigError::DescendingRange { min, max });
        }
        if !(step.is_finite() && step > 0.0) {
            return Err(ParameterConfigError::InvalidStep(step));
        }
        let ratio = (max - min) / step;
        if !(ratio < MAX_GRID_STEPS) {
            return Err(ParameterConfigError::GridTooFine { min, max, step });
        }

        if let Some(Limits { lo, hi }) = self.limits {
            if lo > hi || lo.is_nan() || hi.is_nan() {
                return Err(ParameterConfigError::DescendingLimits { lo, hi });
            }
            if lo == hi {
                return Err(ParameterConfigError::EqualLimits(lo));
            }
            if min < lo || max > hi {
                return Err(ParameterConfigError::RangeOutsideLimits { min, max, lo, hi });
            }
        }

        if self.normalize {
            match self.limits {
                None => return Err(ParameterConfigError::NormalizeWithoutLimits),
                Some(limits) if !limits.is_finite() => {
                    return Err(ParameterConfigError::NormalizeWithInfiniteLimits);
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    pub fn range(&self) -> ValueRange {
        self.range
    }

    pub fn kind(&self) -> ParameterKind {
        self.kind
    }

    pub fn limits(&self) -> Option<Limits> {
        self.limits
    }

    pub fn perturbation(&self) -> PerturbationMode {
        self.perturbation
    }

    pub fn normalizes(&self) -> bool {
        self.normalize
    }

    /// Min-max scale a value against the limits.
    pub fn normalize(&self, value: f64) -> Result<f64, ParameterConfigError> {
        let limits = self.finite_limits()?;
        Ok((value - limits.lo) / (limits.hi - limits.lo))
    }

    /// Inverse of [`ParameterSpec::normalize`].
    pub fn denormalize(&self, x: f64) -> Result<f64, ParameterConfigError> {
        let limits = self.finite_limits()?;
        Ok(x * (limits.hi - limits.lo) + limits.lo)
    }

    fn finite_limits(&self) -> Result<Limits, ParameterConfigError> {
        match self.limits {
            Some(limits) if limits.is_finite() => Ok(limits),
            _ => Err(ParameterConfigError::NotNormalizable),
        }
    }

    /// Draw a uniformly random value from the discretized domain.
    pub fn sample_random<R: Rng>(&self, rng: &mut R) -> CandidateValue {
        let i = rng.gen_range(0..self.range.point_count());
        let value = self.range.point(i);
        CandidateValue::new(self.round(value), 0.0)
    }

    /// Produce an offspring value from a parent value.
    ///
    /// Gaussian noise with `stddev = 0.2^(10^log_width)` is applied around
    /// the parent, in unit space when normalizing. The result is clipped to
    /// the limits either way.
    pub fn perturb<R: Rng>(&self, parent: &CandidateValue, rng: &mut R) -> CandidateValue {
        let stddev = perturbation_stddev(parent.log_width);
        let noise: f64 = rng.sample(rand_distr::StandardNormal);

        let value = match (self.normalize, self.limits) {
            (true, Some(limits)) if limits.is_finite() => {
                let span = limits.hi - limits.lo;
                let unit = (parent.value - limits.lo) / span + noise * stddev;
                limits.clip(unit * span + limits.lo)
            }
            (_, Some(limits)) => limits.clip(parent.value + noise * stddev),
            (_, None) => parent.value + noise * stddev,
        };

        let log_width = match self.perturbation {
            PerturbationMode::Scaled => {
                let noise: f64 = rng.sample(rand_distr::StandardNormal);
                parent.log_width + noise * LOG_WIDTH_STDDEV
            }
            PerturbationMode::Fixed => 0.0,
        };

        CandidateValue::new(self.round(value), log_width)
    }

    /// Coordinate used for euclidean neighbor distance.
    pub fn distance_coordinate(&self, candidate: &CandidateValue) -> f64 {
        match (self.normalize, self.limits) {
            (true, Some(limits)) => (candidate.value - limits.lo) / (limits.hi - limits.lo),
            _ => candidate.value,
        }
    }

    /// Round integer parameters, staying inside the limits when possible.
    fn round(&self, value: f64) -> f64 {
        if self.kind == ParameterKind::Continuous {
            return value;
        }
        let rounded = value.round_ties_even();
        match self.limits {
            Some(limits) if rounded < limits.lo && limits.lo.ceil() <= limits.hi => limits.lo.ceil(),
            Some(limits) if rounded > limits.hi && limits.hi.floor() >= limits.lo => {
                limits.hi.floor()
            }
            _ => rounded,
        }
    }
}

/// Standard deviation of the value noise for a given width exponent.
#[inline]
pub fn perturbation_stddev(log_width: f64) -> f64 {
    WIDTH_BASE.powf(10f64.powf(log_width))
}

/// Builder for [`ParameterSpec`].
#[derive(Debug, Clone)]
pub struct ParameterSpecBuilder {
    range: ValueRange,
    kind: ParameterKind,
    limits: Option<Limits>,
    perturbation: PerturbationMode,
    normalize: bool,
}

impl ParameterSpecBuilder {
    pub fn integer(mut self) -> Self {
        self.kind = ParameterKind::Integer;
        self
    }

    pub fn limits(mut self, lo: f64, hi: f64) -> Self {
        self.limits = Some(Limits::new(lo, hi));
        self
    }

    pub fn scaled(mut self) -> Self {
        self.perturbation = PerturbationMode::Scaled;
        self
    }

    pub fn normalized(mut self) -> Self {
        self.normalize = true;
        self
    }

    pub fn build(self) -> Result<ParameterSpec, ParameterConfigError> {
        ParameterSpec::new(
            self.range,
            self.kind,
            self.limits,
            self.perturbation,
            self.normalize,
        )
    }
}

/// A named dimension of the parameter space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedParameter {
    pub name: String,
    pub spec: ParameterSpec,
}

/// Ordered collection of named parameters. Declaration order is dimension order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSpace {
    parameters: Vec<NamedParameter>,
}

impl ParameterSpace {
    /// Build a space from named specs, rejecting duplicates and empty spaces.
    pub fn new(parameters: Vec<NamedParameter>) -> Result<Self, ParameterConfigError> {
        let space = Self { parameters };
        space.validate()?;
        Ok(space)
    }

    /// Convenience constructor from `(name, spec)` pairs.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, ParameterConfigError>
    where
        I: IntoIterator<Item = (S, ParameterSpec)>,
        S: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, spec)| NamedParameter {
                    name: name.into(),
                    spec,
                })
                .collect(),
        )
    }

    pub fn validate(&self) -> Result<(), ParameterConfigError> {
        if self.parameters.is_empty() {
            return Err(ParameterConfigError::EmptySpace);
        }
        for (i, p) in self.parameters.iter().enumerate() {
            if self.parameters[..i].iter().any(|q| q.name == p.name) {
                return Err(ParameterConfigError::DuplicateName(p.name.clone()));
            }
            p.spec.validate()?;
        }
        Ok(())
    }

    /// Number of dimensions.
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NamedParameter> {
        self.parameters.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    pub fn specs(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.parameters.iter().map(|p| &p.spec)
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.spec)
    }

    /// Coordinates of a candidate vector used for neighbor distances.
    pub fn distance_coordinates(&self, values: &[CandidateValue]) -> Vec<f64> {
        self.specs()
            .zip(values)
            .map(|(spec, v)| spec.distance_coordinate(v))
            .collect()
    }
}

/// Parameter configuration errors. Raised at construction only.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterConfigError {
    #[error("Range must be ascending, got min {min} > max {max}")]
    DescendingRange { min: f64, max: f64 },
    #[error("Range step must be positive and finite, got {0}")]
    InvalidStep(f64),
    #[error("Limits must be ascending, got lo {lo} > hi {hi}")]
    DescendingLimits { lo: f64, hi: f64 },
    #[error("Limits cannot be equal to each other ({0})")]
    EqualLimits(f64),
    #[error("Range [{min}, {max}] must lie within limits [{lo}, {hi}]")]
    RangeOutsideLimits { min: f64, max: f64, lo: f64, hi: f64 },
    #[error("Range [{min}, {max}] with step {step} has too many grid points")]
    GridTooFine { min: f64, max: f64, step: f64 },
    #[error("Normalization requires limits")]
    NormalizeWithoutLimits,
    #[error("Normalization cannot be used with infinite limits")]
    NormalizeWithInfiniteLimits,
    #[error("Parameter has no finite limits to normalize against")]
    NotNormalizable,
    #[error("Parameter kind must be 'integer' or 'continuous', got '{0}'")]
    UnknownKind(String),
    #[error("Perturbation mode must be 'fixed' or 'scaled', got '{0}'")]
    UnknownPerturbation(String),
    #[error("Parameter name '{0}' is declared more than once")]
    DuplicateName(String),
    #[error("Parameter space must contain at least one parameter")]
    EmptySpace,
}
