//! Choosing K for k-means from the inertia curve

use super::kmeans::KMeans;
use crate::error::{JobPowerError, Result};
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use tracing::debug;

/// Inertia recorded for each K tried
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElbowCurve {
    pub ks: Vec<usize>,
    pub inertias: Vec<f64>,
}

impl ElbowCurve {
    /// K at the knee of this curve
    pub fn knee(&self) -> Option<usize> {
        find_knee(&self.ks, &self.inertias)
    }
}

/// Knee of a decreasing curve.
///
/// Both axes are rescaled to [0, 1]; the knee is the point farthest from the
/// straight line joining the first and last points. Ties go to the smallest
/// K. A single point, or a flat curve, returns the first K.
pub fn find_knee(ks: &[usize], inertias: &[f64]) -> Option<usize> {
    if ks.is_empty() || ks.len() != inertias.len() {
        return None;
    }
    let n = ks.len();
    if n < 3 {
        return Some(ks[0]);
    }

    let k_first = ks[0] as f64;
    let k_span = ks[n - 1] as f64 - k_first;
    let y_min = inertias.iter().copied().fold(f64::INFINITY, f64::min);
    let y_max = inertias.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let y_span = y_max - y_min;
    if k_span <= 0.0 || !(y_span > 0.0) {
        return Some(ks[0]);
    }

    let xs: Vec<f64> = ks.iter().map(|&k| (k as f64 - k_first) / k_span).collect();
    let ys: Vec<f64> = inertias.iter().map(|&y| (y - y_min) / y_span).collect();

    let (x0, y0) = (xs[0], ys[0]);
    let (x1, y1) = (xs[n - 1], ys[n - 1]);
    let dx = x1 - x0;
    let dy = y1 - y0;
    let norm = (dx * dx + dy * dy).sqrt();

    let mut best = 0;
    let mut best_dist = f64::NEG_INFINITY;
    for i in 0..n {
        let dist = (dy * xs[i] - dx * ys[i] + x1 * y0 - y1 * x0).abs() / norm;
        if dist > best_dist {
            best_dist = dist;
            best = i;
        }
    }
    Some(ks[best])
}

/// K-Means whose K is picked by the elbow heuristic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElbowKMeans {
    pub k_range: RangeInclusive<usize>,
    pub max_iter: usize,
    pub tol: f64,
    pub n_init: usize,
    pub random_state: u64,
}

/// Outcome of an elbow search
#[derive(Debug, Clone)]
pub struct ElbowFit {
    pub curve: ElbowCurve,
    pub chosen_k: usize,
    pub model: KMeans,
}

impl Default for ElbowKMeans {
    fn default() -> Self {
        Self::new(1..=10)
    }
}

impl ElbowKMeans {
    pub fn new(k_range: RangeInclusive<usize>) -> Self {
        Self {
            k_range,
            max_iter: 300,
            tol: 1e-4,
            n_init: 10,
            random_state: 42,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    fn kmeans(&self, k: usize) -> KMeans {
        KMeans::new(k)
            .with_max_iter(self.max_iter)
            .with_tol(self.tol)
            .with_n_init(self.n_init)
            .with_random_state(self.random_state)
    }

    /// Fit k-means for every K in range and keep the model at the knee.
    ///
    /// The upper end of the range is capped at the number of distinct values.
    pub fn search(&self, x: &Array2<f64>) -> Result<ElbowFit> {
        let (k_min, k_max) = (*self.k_range.start(), *self.k_range.end());
        if k_min == 0 || k_min > k_max {
            return Err(JobPowerError::InvalidParameter {
                name: "k_range".into(),
                value: format!("{}..={}", k_min, k_max),
                reason: "must satisfy 1 <= k_min <= k_max".into(),
            });
        }

        let distinct = count_distinct_rows(x);
        let k_max = k_max.min(distinct);
        if k_max < k_min {
            return Err(JobPowerError::InvalidInput(format!(
                "only {} distinct values, cannot form {} clusters",
                distinct, k_min
            )));
        }

        let mut fits: Vec<KMeans> = (k_min..=k_max)
            .into_par_iter()
            .map(|k| -> Result<KMeans> {
                let mut model = self.kmeans(k);
                model.fit(x)?;
                Ok(model)
            })
            .collect::<Result<Vec<_>>>()?;

        let curve = ElbowCurve {
            ks: (k_min..=k_max).collect(),
            inertias: fits.iter().map(|m| m.inertia().unwrap_or(0.0)).collect(),
        };
        let chosen_k = curve
            .knee()
            .ok_or_else(|| JobPowerError::Training("empty elbow curve".into()))?;
        debug!(ks = ?curve.ks, inertias = ?curve.inertias, chosen_k, "Elbow search finished");

        let model = fits.swap_remove(chosen_k - k_min);
        Ok(ElbowFit {
            curve,
            chosen_k,
            model,
        })
    }
}

fn count_distinct_rows(x: &Array2<f64>) -> usize {
    let mut rows: Vec<Vec<f64>> = x.rows().into_iter().map(|r| r.to_vec()).collect();
    rows.sort_by(|a, b| {
        a.iter()
            .zip(b.iter())
            .map(|(p, q)| p.total_cmp(q))
            .find(|o| o.is_ne())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    rows.dedup();
    rows.len()
}
