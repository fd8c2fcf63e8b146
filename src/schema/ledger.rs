//! Append-only population ledger and generation records.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::{CandidateValue, Seed};

/// Contiguous block of ledger indices produced by one iteration.
///
/// Iteration 0 is random initialization. `end_index` is exclusive, so a
/// generation that produced no offspring has `first_index == end_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub iteration: usize,
    pub first_index: usize,
    pub end_index: usize,
}

impl GenerationRecord {
    /// Last ledger index of the generation, if it holds any seeds.
    pub fn last_index(&self) -> Option<usize> {
        (self.end_index > self.first_index).then(|| self.end_index - 1)
    }

    pub fn len(&self) -> usize {
        self.end_index - self.first_index
    }

    pub fn is_empty(&self) -> bool {
        self.end_index == self.first_index
    }

    pub fn indices(&self) -> Range<usize> {
        self.first_index..self.end_index
    }
}

/// Ordered, append-only store of every evaluated seed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    seeds: Vec<Seed>,
    generations: Vec<GenerationRecord>,
    /// Start of the generation currently being filled.
    open_from: usize,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a seed and return its index.
    pub fn append(&mut self, values: Vec<CandidateValue>, fitness: f64) -> usize {
        let index = self.seeds.len();
        self.seeds.push(Seed {
            index,
            values,
            fitness,
        });
        index
    }

    /// Close the generation spanning every seed appended since the last close.
    pub fn close_generation(&mut self, iteration: usize) -> GenerationRecord {
        let record = GenerationRecord {
            iteration,
            first_index: self.open_from,
            end_index: self.seeds.len(),
        };
        self.generations.push(record);
        self.open_from = record.end_index;
        record
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Seed> {
        self.seeds.get(index)
    }

    pub fn seeds(&self) -> &[Seed] {
        &self.seeds
    }

    pub fn generations(&self) -> &[GenerationRecord] {
        &self.generations
    }

    pub fn generation(&self, iteration: usize) -> Option<&GenerationRecord> {
        self.generations.iter().find(|g| g.iteration == iteration)
    }

    /// Most recently closed generation.
    pub fn latest_generation(&self) -> Option<&GenerationRecord> {
        self.generations.last()
    }

    /// Seeds of a closed generation.
    pub fn generation_seeds(&self, iteration: usize) -> Option<&[Seed]> {
        self.generation(iteration).map(|g| &self.seeds[g.indices()])
    }

    /// Fitness values of a closed generation, in index order.
    pub fn generation_fitness(&self, iteration: usize) -> Option<Vec<f64>> {
        self.generation_seeds(iteration)
            .map(|seeds| seeds.iter().map(|s| s.fitness).collect())
    }

    /// Best seed overall; the lowest index wins ties.
    pub fn best(&self) -> Option<&Seed> {
        best_of(&self.seeds)
    }

    /// Best seed of a closed generation; the lowest index wins ties.
    pub fn generation_best(&self, iteration: usize) -> Option<&Seed> {
        self.generation_seeds(iteration).and_then(best_of)
    }

    /// Check the structural invariants: dense indices and contiguous generations.
    pub fn is_consistent(&self) -> bool {
        let dense = self.seeds.iter().enumerate().all(|(i, s)| s.index == i);
        let contiguous = self
            .generations
            .windows(2)
            .all(|w| w[0].end_index == w[1].first_index && w[0].iteration + 1 == w[1].iteration);
        let starts_at_zero = self.generations.first().is_none_or(|g| g.first_index == 0);
        let covered = self
            .generations
            .last()
            .is_none_or(|g| g.end_index <= self.seeds.len());
        dense && contiguous && starts_at_zero && covered
    }
}

fn best_of(seeds: &[Seed]) -> Option<&Seed> {
    seeds.iter().fold(None, |best: Option<&Seed>, s| match best {
        Some(b) if b.fitness >= s.fitness => Some(b),
        _ => Some(s),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f64) -> Vec<CandidateValue> {
        vec![CandidateValue::new(x, 0.0)]
    }

    #[test]
    fn test_indices_are_dense() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.append(v(1.0), 1.0), 0);
        assert_eq!(ledger.append(v(2.0), 2.0), 1);
        assert_eq!(ledger.get(1).unwrap().index, 1);
        assert!(ledger.is_consistent());
    }

    #[test]
    fn test_generations_are_contiguous() {
        let mut ledger = Ledger::new();
        for i in 0..5 {
            ledger.append(v(i as f64), i as f64);
        }
        let g0 = ledger.close_generation(0);
        assert_eq!((g0.first_index, g0.last_index()), (0, Some(4)));

        for i in 0..3 {
            ledger.append(v(i as f64), 10.0 + i as f64);
        }
        let g1 = ledger.close_generation(1);
        assert_eq!(g0.last_index().unwrap() + 1, g1.first_index);
        assert_eq!(g1.len(), 3);

        let g2 = ledger.close_generation(2);
        assert!(g2.is_empty());
        assert_eq!(g2.last_index(), None);
        assert_eq!(g2.first_index, g1.end_index);
        assert!(ledger.is_consistent());
    }

    #[test]
    fn test_generation_queries() {
        let mut ledger = Ledger::new();
        ledger.append(v(0.0), 3.0);
        ledger.append(v(1.0), 5.0);
        ledger.close_generation(0);
        ledger.append(v(2.0), 4.0);
        ledger.append(v(3.0), 4.0);
        ledger.close_generation(1);

        assert_eq!(ledger.generation_fitness(1), Some(vec![4.0, 4.0]));
        assert_eq!(ledger.generation_best(1).unwrap().index, 2);
        assert_eq!(ledger.best().unwrap().index, 1);
        assert_eq!(ledger.latest_generation().unwrap().iteration, 1);
        assert!(ledger.generation_fitness(7).is_none());
    }
}
