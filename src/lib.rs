//! Paddy Field - Density-aware, gradient-free global optimization.
//!
//! This crate implements the paddy field algorithm, a plant-propagation
//! metaheuristic. Candidate parameter vectors ("seeds") are scored by an
//! opaque fitness function; the fittest seeds reproduce in proportion to
//! their fitness, attenuated by how crowded their neighborhood is, and
//! offspring are Gaussian perturbations of their parents.
//!
//! # Architecture
//!
//! The crate is split into three modules:
//!
//! - `schema`: Parameter model, configuration, ledger and report types
//! - `compute`: Sowing, pollination, propagation and the run state machine
//! - `checkpoint`: Primary/backup persistence for resumable runs
//!
//! # Example
//!
//! ```rust,no_run
//! use paddy_field::{
//!     checkpoint::CheckpointStore,
//!     compute::Runner,
//!     schema::{CandidateValue, ParameterSpace, ParameterSpec, RunnerConfig},
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let unit = ParameterSpec::builder(0.0, 1.0, 0.1)
//!         .limits(0.0, 1.0)
//!         .scaled()
//!         .normalized()
//!         .build()?;
//!     let space = ParameterSpace::from_pairs([("x", unit.clone()), ("y", unit)])?;
//!
//!     let fitness = |v: &[CandidateValue]| -(v[0].value - 0.3).powi(2) - (v[1].value - 0.6).powi(2);
//!     let mut runner = Runner::new(RunnerConfig::default(), space, fitness)?
//!         .with_checkpoint(CheckpointStore::new("paddy.ckpt"));
//!     runner.run()?;
//!
//!     if let Some(best) = runner.ledger().best() {
//!         println!("Best fitness {} at {:?}", best.fitness, best.parameters());
//!     }
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use checkpoint::{CheckpointStore, RecoveryError};
pub use compute::{Evaluator, ParallelEvaluator, Runner, RunnerError, RunnerState};
pub use schema::{
    CandidateValue, Ledger, Objective, OptimizationConfig, ParameterSpace, ParameterSpec,
    RankingMode, RunReport, RunStatus, RunnerConfig, Seed,
};
