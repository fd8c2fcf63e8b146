//! Sowing: rank the scope and assign raw reproduction quotas.

use log::warn;

use crate::schema::{Ledger, RankingMode};

/// Raw quota for one selected seed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectionEntry {
    pub seed_index: usize,
    pub raw_quota: f64,
}

/// Outcome of one sowing pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    /// Threshold in effect after the boundary correction.
    pub threshold: usize,
    /// Number of seeds that competed.
    pub scope_size: usize,
    /// Best seed of the scope, if the scope was non-empty.
    pub best: Option<usize>,
    /// Selected seeds, best first. Empty means no gradient is left to exploit.
    pub entries: Vec<SelectionEntry>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn raw_quota_sum(&self) -> f64 {
        self.entries.iter().map(|e| e.raw_quota).sum()
    }
}

/// Threshold actually usable against a scope of `count` seeds.
///
/// A threshold larger than the scope drops to three quarters of it, rounded
/// half to even. The correction never raises the threshold.
pub fn corrected_threshold(threshold: usize, count: usize) -> usize {
    if threshold <= count {
        threshold
    } else {
        (0.75 * count as f64).round_ties_even() as usize
    }
}

/// Rank the scope chosen by `mode` and compute raw quotas for the top `threshold` seeds.
///
/// Quotas scale linearly from 0 at the threshold fitness to `max_offspring`
/// at the best fitness. When the threshold fitness equals the best the
/// selection is empty.
pub fn sow(ledger: &Ledger, mode: RankingMode, threshold: usize, max_offspring: usize) -> Selection {
    let scope = match mode {
        RankingMode::Population => ledger.seeds(),
        RankingMode::Generational => match ledger.latest_generation() {
            Some(generation) => &ledger.seeds()[generation.indices()],
            None => &[],
        },
    };

    let count = scope.len();
    let yt = corrected_threshold(threshold, count);
    if yt != threshold {
        warn!(
            "Threshold {} exceeds the {} seeds in scope; using {}",
            threshold, count, yt
        );
    }

    let mut ranked: Vec<(usize, f64)> = scope.iter().map(|s| (s.index, s.fitness)).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut selection = Selection {
        threshold: yt,
        scope_size: count,
        best: ranked.first().map(|&(index, _)| index),
        entries: Vec::new(),
    };
    if yt == 0 {
        return selection;
    }

    let y_max = ranked[0].1;
    let yt_val = ranked[yt - 1].1;
    if yt_val == y_max {
        return selection;
    }

    let span = y_max - yt_val;
    selection.entries = ranked[..yt]
        .iter()
        .map(|&(seed_index, fitness)| SelectionEntry {
            seed_index,
            raw_quota: max_offspring as f64 * (fitness - yt_val) / span,
        })
        .collect();
    selection
}
