//! Propagation: realize final quotas as evaluated offspring.

use log::info;
use rayon::prelude::*;

use super::pollination::Pollination;
use super::rng::SeedRng;
use crate::schema::{CandidateValue, GenerationRecord, Ledger, ParameterSpace};

/// Scoring function boundary. Fitness is maximized.
///
/// Any `Fn(&[CandidateValue]) -> f64` is an evaluator. Each call may be
/// arbitrarily expensive and blocks until it returns.
pub trait Evaluator {
    /// Score one candidate vector, in parameter-space order.
    fn evaluate(&self, values: &[CandidateValue]) -> f64;

    /// Score a batch, returning fitness in input order.
    fn evaluate_batch(&self, batch: &[Vec<CandidateValue>]) -> Vec<f64> {
        batch.iter().map(|values| self.evaluate(values)).collect()
    }
}

impl<F> Evaluator for F
where
    F: Fn(&[CandidateValue]) -> f64,
{
    fn evaluate(&self, values: &[CandidateValue]) -> f64 {
        self(values)
    }
}

/// Evaluates batches on a bounded rayon pool, collecting results in order.
pub struct ParallelEvaluator<E> {
    inner: E,
    pool: rayon::ThreadPool,
}

impl<E: Evaluator + Sync> ParallelEvaluator<E> {
    /// Wrap `inner` with a pool of `workers` threads.
    pub fn new(inner: E, workers: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("paddy-eval-{i}"))
            .build()?;
        Ok(Self { inner, pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

impl<E: Evaluator + Sync> Evaluator for ParallelEvaluator<E> {
    fn evaluate(&self, values: &[CandidateValue]) -> f64 {
        self.inner.evaluate(values)
    }

    fn evaluate_batch(&self, batch: &[Vec<CandidateValue>]) -> Vec<f64> {
        self.pool.install(|| {
            batch
                .par_iter()
                .map(|values| self.inner.evaluate(values))
                .collect()
        })
    }
}

/// Perturb, evaluate and append every offspring of one iteration, then close
/// its generation.
///
/// Offspring are drawn in selection order, then repeat order, before any
/// evaluation happens, so ledger indices do not depend on how the batch is
/// scored.
pub fn propagate<E: Evaluator + ?Sized>(
    space: &ParameterSpace,
    ledger: &mut Ledger,
    pollination: &Pollination,
    rng: &mut SeedRng,
    evaluator: &E,
    iteration: usize,
) -> GenerationRecord {
    let mut offspring = Vec::with_capacity(pollination.total_quota());
    for entry in pollination.entries.iter().filter(|e| e.final_quota > 0) {
        let Some(parent) = ledger.get(entry.seed_index) else {
            continue;
        };
        for _ in 0..entry.final_quota {
            offspring.push(rng.perturb_vector(space, &parent.values));
        }
    }

    let fitness = evaluator.evaluate_batch(&offspring);
    for (values, fitness) in offspring.into_iter().zip(fitness) {
        ledger.append(values, fitness);
    }

    let record = ledger.close_generation(iteration);
    match ledger.generation_best(iteration) {
        Some(best) => info!(
            "Generation {}: seeds {}..{}, best fitness {:.6}",
            iteration, record.first_index, record.end_index, best.fitness
        ),
        None => info!("Generation {}: no offspring", iteration),
    }
    record
}
