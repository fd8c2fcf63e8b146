//! Pollination: density-aware attenuation of raw quotas.
//!
//! Seeds in crowded regions keep most of their quota, isolated seeds lose
//! part of it. Density is the number of other selected seeds within a
//! radius. When the configured radius finds no neighbors at all, the radius
//! is relaxed to quantiles of the observed pairwise distances, from the 75th
//! percentile down to the 5th. If that also fails, every seed is treated as
//! having one neighbor.

use log::{debug, warn};

use super::sowing::Selection;
use crate::schema::{Ledger, ParameterSpace};

/// Quantiles tried after the configured radius, in percent.
const QUANTILE_LADDER: [u32; 15] = [75, 70, 65, 60, 55, 50, 45, 40, 35, 30, 25, 20, 15, 10, 5];

/// Final quota of one selected seed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DensityEntry {
    pub seed_index: usize,
    pub raw_quota: f64,
    pub neighbor_count: usize,
    /// `exp(neighbor_count / max_neighbor_count - 1)`, in (0, 1].
    pub pollination_factor: f64,
    pub final_quota: usize,
}

/// Radius that produced the neighbor counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NeighborRadius {
    /// The configured radius found neighbors.
    Configured(f64),
    /// A quantile of the pairwise distances found neighbors.
    Quantile { q: f64, radius: f64 },
    /// Nothing found neighbors; every count forced to 1.
    Neutral,
}

/// Outcome of one pollination pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Pollination {
    pub radius: NeighborRadius,
    /// Entries in selection order.
    pub entries: Vec<DensityEntry>,
}

impl Pollination {
    /// Offspring the propagation step will produce.
    pub fn total_quota(&self) -> usize {
        self.entries.iter().map(|e| e.final_quota).sum()
    }
}

/// Row-major `k x k` euclidean distance matrix.
pub fn distance_matrix(points: &[Vec<f64>]) -> Vec<f64> {
    let k = points.len();
    let mut matrix = vec![0.0; k * k];
    for i in 0..k {
        for j in (i + 1)..k {
            let d = points[i]
                .iter()
                .zip(&points[j])
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            matrix[i * k + j] = d;
            matrix[j * k + i] = d;
        }
    }
    matrix
}

/// Number of other points strictly closer than `radius`, per point.
pub fn count_neighbors(matrix: &[f64], k: usize, radius: f64) -> Vec<usize> {
    (0..k)
        .map(|i| {
            (0..k)
                .filter(|&j| j != i && matrix[i * k + j] < radius)
                .count()
        })
        .collect()
}

/// Linearly interpolated quantile of an ascending slice.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let pos = q.clamp(0.0, 1.0) * last as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Attenuate the raw quotas of a selection by local seed density.
pub fn pollinate(
    space: &ParameterSpace,
    ledger: &Ledger,
    selection: &Selection,
    radius: f64,
) -> Pollination {
    let points: Vec<Vec<f64>> = selection
        .entries
        .iter()
        .filter_map(|e| ledger.get(e.seed_index))
        .map(|seed| space.distance_coordinates(&seed.values))
        .collect();
    let k = points.len();
    let matrix = distance_matrix(&points);

    let (counts, used) = neighbor_counts(&matrix, k, radius);
    debug!("Pollinating {} seeds with {:?}", k, used);

    let max_count = counts.iter().copied().max().unwrap_or(0).max(1);
    let entries = selection
        .entries
        .iter()
        .zip(counts)
        .map(|(entry, neighbor_count)| {
            let pollination_factor = (neighbor_count as f64 / max_count as f64 - 1.0).exp();
            DensityEntry {
                seed_index: entry.seed_index,
                raw_quota: entry.raw_quota,
                neighbor_count,
                pollination_factor,
                final_quota: (entry.raw_quota * pollination_factor).round_ties_even() as usize,
            }
        })
        .collect();

    Pollination {
        radius: used,
        entries,
    }
}

fn neighbor_counts(matrix: &[f64], k: usize, radius: f64) -> (Vec<usize>, NeighborRadius) {
    let counts = count_neighbors(matrix, k, radius);
    if counts.iter().any(|&c| c > 0) {
        return (counts, NeighborRadius::Configured(radius));
    }

    // Each unordered pair appears twice, like the full matrix does.
    let mut distances: Vec<f64> = (0..k)
        .flat_map(|i| (0..k).filter(move |&j| j != i).map(move |j| (i, j)))
        .map(|(i, j)| matrix[i * k + j])
        .collect();
    distances.sort_by(f64::total_cmp);

    for percent in QUANTILE_LADDER {
        let q = f64::from(percent) / 100.0;
        let Some(relaxed) = quantile(&distances, q) else {
            break;
        };
        let counts = count_neighbors(matrix, k, relaxed);
        if counts.iter().any(|&c| c > 0) {
            return (counts, NeighborRadius::Quantile { q, radius: relaxed });
        }
    }

    warn!(
        "No neighbors found among {} selected seeds at any radius; using neutral pollination",
        k
    );
    (vec![1; k], NeighborRadius::Neutral)
}
