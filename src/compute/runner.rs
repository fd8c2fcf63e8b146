//! Generational state machine driving one optimization.
//!
//! A run moves `Uninitialized -> Running -> Converged | Completed`. All
//! mutable run data lives in [`RunnerState`], which is what checkpoints
//! persist; [`Runner`] pairs it with the evaluator and an optional
//! checkpoint store.

use std::path::Path;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::pollination::pollinate;
use super::propagation::{propagate, Evaluator};
use super::rng::SeedRng;
use super::sowing::{corrected_threshold, sow};
use crate::checkpoint::{CheckpointStore, RecoveryError};
use crate::schema::{
    GenerationRecord, IterationBest, Ledger, ParameterConfigError, ParameterSpace, RankingMode,
    RunHistory, RunProgress, RunReport, RunStatus, RunnerConfig, RunnerConfigError, Seed,
};

/// Complete, serializable state of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerState {
    pub config: RunnerConfig,
    pub space: ParameterSpace,
    pub ledger: Ledger,
    /// Threshold for the next sowing (yt).
    pub threshold: usize,
    /// Configured threshold that `threshold` returns to after every sowing.
    pub base_threshold: usize,
    /// Completed iterations; the latest closed generation has this id.
    pub iteration: usize,
    pub iteration_limit: usize,
    pub status: RunStatus,
    /// Base RNG seed; iteration `n` draws from a stream derived from `(rng_seed, n)`.
    pub rng_seed: u64,
    pub iteration_bests: Vec<IterationBest>,
}

impl RunnerState {
    /// Validate the configuration and create a fresh state.
    pub fn new(config: RunnerConfig, space: ParameterSpace) -> Result<Self, RunnerError> {
        config.validate()?;
        space.validate()?;

        let threshold = corrected_threshold(config.threshold, config.rand_seed_number);
        if threshold != config.threshold {
            warn!(
                "Threshold {} exceeds the {} random seeds; the first sowing uses {}",
                config.threshold, config.rand_seed_number, threshold
            );
        }

        Ok(Self {
            threshold,
            base_threshold: config.threshold,
            iteration: 0,
            iteration_limit: config.iterations,
            status: RunStatus::Uninitialized,
            rng_seed: config.random_seed.unwrap_or_else(rand::random),
            ledger: Ledger::new(),
            iteration_bests: Vec::new(),
            space,
            config,
        })
    }

    /// Whether a deserialized state is internally coherent.
    pub fn is_valid(&self) -> bool {
        let dims = self.space.len();
        let generations = match self.ledger.generations().len() {
            0 => self.status == RunStatus::Uninitialized && self.ledger.is_empty(),
            n => n == self.iteration + 1 && self.iteration <= self.iteration_limit,
        };
        generations
            && self.config.validate().is_ok()
            && self.space.validate().is_ok()
            && self.ledger.is_consistent()
            && self.ledger.seeds().iter().all(|s| s.values.len() == dims)
    }
}

/// Errors raised while building, running or recovering a run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error(transparent)]
    Config(#[from] RunnerConfigError),
    #[error(transparent)]
    Parameter(#[from] ParameterConfigError),
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
    #[error("Iteration extension must be a positive integer that keeps the limit representable")]
    ExtensionRejected,
    #[error("Failed to write checkpoint: {0}")]
    Checkpoint(#[from] std::io::Error),
}

/// Drives sowing, pollination and propagation over a ledger.
pub struct Runner<E> {
    state: RunnerState,
    evaluator: E,
    store: Option<CheckpointStore>,
}

impl<E: Evaluator> Runner<E> {
    /// Create a run. Fails on invalid configuration.
    pub fn new(
        config: RunnerConfig,
        space: ParameterSpace,
        evaluator: E,
    ) -> Result<Self, RunnerError> {
        Ok(Self::from_state(RunnerState::new(config, space)?, evaluator))
    }

    /// Wrap an existing state, e.g. one read from a checkpoint.
    pub fn from_state(state: RunnerState, evaluator: E) -> Self {
        Self {
            state,
            evaluator,
            store: None,
        }
    }

    /// Recover a run from the checkpoint pair at `path`. Later saves go to
    /// the same pair.
    pub fn recover(path: impl AsRef<Path>, evaluator: E) -> Result<Self, RunnerError> {
        let store = CheckpointStore::new(path.as_ref());
        let state = store.recover()?;
        info!(
            "Recovered run at iteration {} of {} ({} seeds)",
            state.iteration,
            state.iteration_limit,
            state.ledger.len()
        );
        Ok(Self::from_state(state, evaluator).with_checkpoint(store))
    }

    /// Persist state to `store` at every iteration boundary.
    pub fn with_checkpoint(mut self, store: CheckpointStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Run until the iteration limit or convergence.
    pub fn run(&mut self) -> Result<RunStatus, RunnerError> {
        self.run_with_callback(|_| {})
    }

    /// Run, reporting progress after random initialization and every iteration.
    pub fn run_with_callback<F>(&mut self, mut callback: F) -> Result<RunStatus, RunnerError>
    where
        F: FnMut(&RunProgress),
    {
        match self.state.status {
            RunStatus::Completed => {
                info!(
                    "Run already completed {} iterations; extend it to continue",
                    self.state.iteration
                );
                return Ok(RunStatus::Completed);
            }
            RunStatus::Converged => {
                info!("Run converged at iteration {}", self.state.iteration);
                return Ok(RunStatus::Converged);
            }
            RunStatus::Uninitialized => {
                self.initialize()?;
                callback(&self.progress());
            }
            RunStatus::Running => {}
        }

        while self.state.iteration < self.state.iteration_limit {
            let status = self.step()?;
            callback(&self.progress());
            if status == RunStatus::Converged {
                return Ok(status);
            }
        }

        self.complete()?;
        callback(&self.progress());
        Ok(RunStatus::Completed)
    }

    /// Continue from the stored iteration count. A finished run is left as is.
    pub fn resume(&mut self) -> Result<RunStatus, RunnerError> {
        self.resume_with_callback(|_| {})
    }

    pub fn resume_with_callback<F>(&mut self, callback: F) -> Result<RunStatus, RunnerError>
    where
        F: FnMut(&RunProgress),
    {
        if !self.state.status.is_finished() {
            info!(
                "Resuming at iteration {} of {}",
                self.state.iteration, self.state.iteration_limit
            );
        }
        self.run_with_callback(callback)
    }

    /// Raise the iteration limit by `additional` and continue.
    pub fn extend(&mut self, additional: usize) -> Result<RunStatus, RunnerError> {
        self.extend_with_callback(additional, |_| {})
    }

    pub fn extend_with_callback<F>(
        &mut self,
        additional: usize,
        callback: F,
    ) -> Result<RunStatus, RunnerError>
    where
        F: FnMut(&RunProgress),
    {
        let limit = match self.state.iteration_limit.checked_add(additional) {
            Some(limit) if additional > 0 => limit,
            _ => return Err(RunnerError::ExtensionRejected),
        };
        self.state.iteration_limit = limit;
        if self.state.status.is_finished() {
            self.state.status = RunStatus::Running;
        }
        info!(
            "Extended run by {} iterations to {}",
            additional, self.state.iteration_limit
        );
        self.run_with_callback(callback)
    }

    fn initialize(&mut self) -> Result<(), RunnerError> {
        let state = &mut self.state;
        let mut rng = SeedRng::for_iteration(state.rng_seed, 0);
        let batch: Vec<_> = (0..state.config.rand_seed_number)
            .map(|_| rng.random_vector(&state.space))
            .collect();
        let fitness = self.evaluator.evaluate_batch(&batch);
        for (values, fitness) in batch.into_iter().zip(fitness) {
            state.ledger.append(values, fitness);
        }
        let record = state.ledger.close_generation(0);
        state.status = RunStatus::Running;
        info!(
            "Sowed {} random seeds (rng seed {})",
            record.len(),
            state.rng_seed
        );
        self.checkpoint()
    }

    /// One sowing, pollination and propagation pass.
    fn step(&mut self) -> Result<RunStatus, RunnerError> {
        let state = &mut self.state;
        let selection = sow(
            &state.ledger,
            state.config.ranking_mode,
            state.threshold,
            state.config.max_offspring,
        );
        state.threshold = selection.threshold;
        if let Some(best) = selection.best {
            self.record_best(best);
        }

        let state = &mut self.state;
        if selection.is_empty() {
            state.status = RunStatus::Converged;
            info!(
                "Converged at iteration {}: no fitness gradient among the top {} seeds",
                state.iteration, state.threshold
            );
            return Ok(RunStatus::Converged);
        }
        state.threshold = state.base_threshold;

        let pollination = pollinate(&state.space, &state.ledger, &selection, state.config.radius);
        debug!(
            "Iteration {}: raw quota {:.3}, final quota {}, radius {:?}",
            state.iteration + 1,
            selection.raw_quota_sum(),
            pollination.total_quota(),
            pollination.radius
        );

        let iteration = state.iteration + 1;
        let mut rng = SeedRng::for_iteration(state.rng_seed, iteration);
        propagate(
            &state.space,
            &mut state.ledger,
            &pollination,
            &mut rng,
            &self.evaluator,
            iteration,
        );
        state.iteration = iteration;
        self.checkpoint()?;
        Ok(RunStatus::Running)
    }

    fn complete(&mut self) -> Result<(), RunnerError> {
        let ledger = &self.state.ledger;
        let best = match self.state.config.ranking_mode {
            RankingMode::Population => ledger.best(),
            RankingMode::Generational => ledger
                .latest_generation()
                .and_then(|g| ledger.generation_best(g.iteration)),
        }
        .map(|s| s.index);
        if let Some(best) = best {
            self.record_best(best);
        }

        self.state.status = RunStatus::Completed;
        match self.state.ledger.best() {
            Some(best) => info!(
                "Completed {} iterations; best fitness {:.6} at seed {}",
                self.state.iteration, best.fitness, best.index
            ),
            None => info!("Completed {} iterations", self.state.iteration),
        }
        self.checkpoint()
    }

    /// Record the best seed for the current iteration, replacing an earlier
    /// record for the same iteration.
    fn record_best(&mut self, seed_index: usize) {
        let Some(seed) = self.state.ledger.get(seed_index) else {
            return;
        };
        let best = IterationBest::from_seed(self.state.iteration, seed);
        match self.state.iteration_bests.last_mut() {
            Some(last) if last.iteration == best.iteration => *last = best,
            _ => self.state.iteration_bests.push(best),
        }
    }

    fn checkpoint(&self) -> Result<(), RunnerError> {
        if let Some(store) = &self.store {
            store.save(&self.state)?;
        }
        Ok(())
    }
}

impl<E> Runner<E> {
    pub fn state(&self) -> &RunnerState {
        &self.state
    }

    pub fn into_state(self) -> RunnerState {
        self.state
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn status(&self) -> RunStatus {
        self.state.status
    }

    /// Completed iterations.
    pub fn iteration(&self) -> usize {
        self.state.iteration
    }

    /// Threshold the next sowing will use.
    pub fn threshold(&self) -> usize {
        self.state.threshold
    }

    pub fn ledger(&self) -> &Ledger {
        &self.state.ledger
    }

    pub fn generations(&self) -> &[GenerationRecord] {
        self.state.ledger.generations()
    }

    pub fn iteration_bests(&self) -> &[IterationBest] {
        &self.state.iteration_bests
    }

    pub fn generation_fitness(&self, iteration: usize) -> Option<Vec<f64>> {
        self.state.ledger.generation_fitness(iteration)
    }

    /// Indices of every seed sharing the best fitness.
    pub fn top_seeds(&self) -> Vec<usize> {
        tied_best(self.state.ledger.seeds())
    }

    /// Indices of every seed sharing the best fitness within a generation.
    pub fn generation_top_seeds(&self, iteration: usize) -> Vec<usize> {
        self.state
            .ledger
            .generation_seeds(iteration)
            .map(tied_best)
            .unwrap_or_default()
    }

    pub fn history(&self) -> RunHistory {
        let ledger = &self.state.ledger;
        let mut history = RunHistory {
            best_fitness: self.state.iteration_bests.iter().map(|b| b.fitness).collect(),
            ..Default::default()
        };

        let mut total = 0.0;
        for generation in ledger.generations() {
            let seeds = &ledger.seeds()[generation.indices()];
            let sum: f64 = seeds.iter().map(|s| s.fitness).sum();
            total += sum;
            if !seeds.is_empty() {
                history.generation_average.push(sum / seeds.len() as f64);
            }
            if generation.end_index > 0 {
                history
                    .population_average
                    .push(total / generation.end_index as f64);
            }
        }
        history
    }

    pub fn progress(&self) -> RunProgress {
        let ledger = &self.state.ledger;
        RunProgress {
            iteration: self.state.iteration,
            iteration_limit: self.state.iteration_limit,
            status: self.state.status,
            best_fitness: ledger.best().map(|s| s.fitness),
            evaluations: ledger.len(),
            generation_size: ledger.latest_generation().map_or(0, GenerationRecord::len),
        }
    }

    pub fn report(&self) -> RunReport {
        let ledger = &self.state.ledger;
        RunReport {
            status: self.state.status,
            iterations: self.state.iteration,
            config: self.state.config.clone(),
            parameter_names: self.state.space.names().map(String::from).collect(),
            best: ledger.best().cloned(),
            iteration_bests: self.state.iteration_bests.clone(),
            generations: ledger.generations().to_vec(),
            generation_fitness: ledger
                .generations()
                .iter()
                .map(|g| {
                    ledger.seeds()[g.indices()]
                        .iter()
                        .map(|s| s.fitness)
                        .collect::<Vec<f64>>()
                })
                .collect(),
            history: self.history(),
        }
    }
}

fn tied_best(seeds: &[Seed]) -> Vec<usize> {
    let Some(max) = seeds.iter().map(|s| s.fitness).reduce(f64::max) else {
        return Vec::new();
    };
    seeds
        .iter()
        .filter(|s| s.fitness == max)
        .map(|s| s.index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::propagation::ParallelEvaluator;
    use crate::schema::{CandidateValue, ParameterSpec};

    fn space() -> ParameterSpace {
        let spec = ParameterSpec::builder(0.0, 1.0, 0.1)
            .limits(0.0, 1.0)
            .scaled()
            .normalized()
            .build()
            .unwrap();
        ParameterSpace::from_pairs([("x", spec.clone()), ("y", spec)]).unwrap()
    }

    fn config(iterations: usize) -> RunnerConfig {
        RunnerConfig {
            rand_seed_number: 20,
            threshold: 8,
            max_offspring: 6,
            radius: 0.2,
            ranking_mode: RankingMode::Population,
            iterations,
            random_seed: Some(7),
        }
    }

    fn peak(values: &[CandidateValue]) -> f64 {
        let (x, y) = (values[0].value, values[1].value);
        -(x - 0.3).powi(2) - (y - 0.7).powi(2)
    }

    fn flat(_: &[CandidateValue]) -> f64 {
        1.0
    }

    #[test]
    fn test_random_seed_minimum() {
        let err = Runner::new(
            RunnerConfig {
                rand_seed_number: 4,
                ..config(3)
            },
            space(),
            peak,
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            RunnerError::Config(RunnerConfigError::TooFewRandomSeeds(4))
        ));

        let runner = Runner::new(
            RunnerConfig {
                rand_seed_number: 5,
                ..config(3)
            },
            space(),
            peak,
        );
        assert!(runner.is_ok());
    }

    #[test]
    fn test_oversized_threshold_is_reset() {
        let runner = Runner::new(
            RunnerConfig {
                rand_seed_number: 5,
                threshold: 10,
                ..config(3)
            },
            space(),
            peak,
        )
        .unwrap();
        assert_eq!(runner.threshold(), 4);
        assert_eq!(runner.state().base_threshold, 10);
    }

    #[test]
    fn test_run_completes_with_contiguous_generations() {
        let mut runner = Runner::new(config(5), space(), peak).unwrap();
        assert_eq!(runner.run().unwrap(), RunStatus::Completed);
        assert_eq!(runner.iteration(), 5);

        let generations = runner.generations();
        assert_eq!(generations.len(), 6);
        assert_eq!(generations[0].len(), 20);
        for pair in generations.windows(2) {
            assert_eq!(pair[0].end_index, pair[1].first_index);
            if let Some(last) = pair[0].last_index() {
                assert_eq!(last + 1, pair[1].first_index);
            }
        }
        assert_eq!(generations.last().unwrap().end_index, runner.ledger().len());

        let iterations: Vec<usize> = runner.iteration_bests().iter().map(|b| b.iteration).collect();
        assert_eq!(iterations, vec![0, 1, 2, 3, 4, 5]);
        // Population ranking never loses its best seed.
        let bests: Vec<f64> = runner.iteration_bests().iter().map(|b| b.fitness).collect();
        assert!(bests.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(runner.threshold(), 8);
    }

    #[test]
    fn test_flat_fitness_converges_without_mutation() {
        let mut runner = Runner::new(config(5), space(), flat).unwrap();
        assert_eq!(runner.run().unwrap(), RunStatus::Converged);
        assert_eq!(runner.iteration(), 0);
        assert_eq!(runner.ledger().len(), 20);

        let before = runner.state().ledger.clone();
        assert_eq!(runner.run().unwrap(), RunStatus::Converged);
        assert_eq!(runner.resume().unwrap(), RunStatus::Converged);
        assert_eq!(runner.state().ledger, before);
    }

    #[test]
    fn test_resume_completed_is_noop() {
        let mut runner = Runner::new(config(2), space(), peak).unwrap();
        runner.run().unwrap();
        let before = runner.state().clone();
        assert_eq!(runner.resume().unwrap(), RunStatus::Completed);
        assert_eq!(runner.state(), &before);
    }

    #[test]
    fn test_zero_extension_rejected() {
        let mut runner = Runner::new(config(2), space(), peak).unwrap();
        runner.run().unwrap();
        let before = runner.state().clone();
        assert!(matches!(runner.extend(0), Err(RunnerError::ExtensionRejected)));
        assert_eq!(runner.state(), &before);
    }

    #[test]
    fn test_overflowing_extension_rejected() {
        let mut runner = Runner::new(config(2), space(), peak).unwrap();
        runner.run().unwrap();
        let before = runner.state().clone();
        assert!(matches!(
            runner.extend(usize::MAX),
            Err(RunnerError::ExtensionRejected)
        ));
        assert_eq!(runner.state(), &before);
    }

    #[test]
    fn test_extension_matches_uninterrupted_run() {
        let mut whole = Runner::new(config(4), space(), peak).unwrap();
        whole.run().unwrap();

        let mut split = Runner::new(config(2), space(), peak).unwrap();
        split.run().unwrap();
        assert_eq!(split.extend(2).unwrap(), RunStatus::Completed);

        assert_eq!(split.iteration(), 4);
        assert_eq!(split.ledger(), whole.ledger());
        assert_eq!(split.iteration_bests(), whole.iteration_bests());
    }

    #[test]
    fn test_parallel_evaluation_is_deterministic() {
        let mut sequential = Runner::new(config(3), space(), peak).unwrap();
        sequential.run().unwrap();

        let evaluator = ParallelEvaluator::new(peak, 3).unwrap();
        let mut parallel = Runner::new(config(3), space(), evaluator).unwrap();
        parallel.run().unwrap();

        assert_eq!(sequential.ledger(), parallel.ledger());
    }

    #[test]
    fn test_generational_ranking() {
        let mut runner = Runner::new(
            RunnerConfig {
                ranking_mode: RankingMode::Generational,
                ..config(3)
            },
            space(),
            peak,
        )
        .unwrap();
        let status = runner.run().unwrap();
        assert!(status.is_finished());

        for best in runner.iteration_bests() {
            let generation = runner.ledger().generation(best.iteration).unwrap();
            assert!(generation.indices().contains(&best.seed_index));
        }
    }

    #[test]
    fn test_progress_callback() {
        let mut runner = Runner::new(config(3), space(), peak).unwrap();
        let mut seen = Vec::new();
        runner
            .run_with_callback(|p| seen.push((p.iteration, p.status)))
            .unwrap();

        assert_eq!(seen.first(), Some(&(0, RunStatus::Running)));
        assert_eq!(seen.last(), Some(&(3, RunStatus::Completed)));
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn test_reporting_snapshots() {
        let mut runner = Runner::new(config(3), space(), peak).unwrap();
        runner.run().unwrap();

        let best = runner.ledger().best().unwrap().index;
        assert!(runner.top_seeds().contains(&best));
        assert_eq!(
            runner.generation_fitness(0).unwrap().len(),
            runner.generations()[0].len()
        );
        assert!(!runner.generation_top_seeds(0).is_empty());
        assert!(runner.generation_top_seeds(99).is_empty());

        let history = runner.history();
        assert_eq!(history.best_fitness.len(), runner.iteration_bests().len());
        assert_eq!(history.population_average.len(), 4);

        let report = runner.report();
        assert_eq!(report.parameter_names, vec!["x", "y"]);
        assert_eq!(report.generation_fitness.len(), 4);
        assert_eq!(report.best.unwrap().index, best);
        let json = serde_json::to_string(&runner.report()).unwrap();
        assert!(json.contains("\"iteration_bests\""));
    }

    #[test]
    fn test_top_seeds_returns_ties() {
        let mut ledger = Ledger::new();
        for f in [1.0, 3.0, 2.0, 3.0] {
            ledger.append(vec![CandidateValue::new(0.0, 0.0)], f);
        }
        ledger.close_generation(0);
        assert_eq!(tied_best(ledger.seeds()), vec![1, 3]);
        assert!(tied_best(&[]).is_empty());
    }
}
