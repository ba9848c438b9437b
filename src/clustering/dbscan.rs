//! DBSCAN over a single numeric column

use crate::error::{JobPowerError, Result};
use serde::{Deserialize, Serialize};

/// Label reserved for points that belong to no cluster
pub const NOISE: i64 = -1;

/// DBSCAN (Density-Based Spatial Clustering of Applications with Noise)
///
/// Points are classified as core, border, or noise:
/// - Core: has ≥ min_samples neighbors within eps (the point itself counts)
/// - Border: within eps of a core point but not core itself
/// - Noise: neither core nor border (label = -1)
///
/// Cluster ids follow the input order of each cluster's first core point, and
/// a border point reachable from several clusters joins the one with the
/// smallest id. Sorting the values lets neighbourhoods be found by binary
/// search, so memory stays linear in the number of points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dbscan {
    pub eps: f64,
    pub min_samples: usize,
    labels: Option<Vec<i64>>,
    n_clusters_found: usize,
    n_noise: usize,
}

impl Default for Dbscan {
    fn default() -> Self {
        Self::new(0.5, 5)
    }
}

impl Dbscan {
    pub fn new(eps: f64, min_samples: usize) -> Self {
        Self {
            eps,
            min_samples,
            labels: None,
            n_clusters_found: 0,
            n_noise: 0,
        }
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self
    }

    pub fn fit(&mut self, values: &[f64]) -> Result<&mut Self> {
        if !(self.eps > 0.0 && self.eps.is_finite()) {
            return Err(JobPowerError::InvalidParameter {
                name: "eps".into(),
                value: self.eps.to_string(),
                reason: "must be a positive number".into(),
            });
        }
        if self.min_samples == 0 {
            return Err(JobPowerError::InvalidParameter {
                name: "min_samples".into(),
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(JobPowerError::InvalidInput("DBSCAN input contains non-finite values".into()));
        }

        let n = values.len();
        let eps = self.eps;

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]).then(a.cmp(&b)));
        let sorted: Vec<f64> = order.iter().map(|&i| values[i]).collect();

        // Neighbour count of each sorted position, itself included
        let is_core: Vec<bool> = sorted
            .iter()
            .map(|&v| {
                let lo = sorted.partition_point(|&s| v - s > eps);
                let hi = sorted.partition_point(|&s| s - v <= eps);
                hi - lo >= self.min_samples
            })
            .collect();

        // Consecutive core points closer than eps are density-connected
        let mut component = vec![usize::MAX; n];
        let mut component_first_input: Vec<usize> = Vec::new();
        let mut prev_core: Option<usize> = None;
        for p in 0..n {
            if !is_core[p] {
                continue;
            }
            let joins_previous = prev_core.map_or(false, |q| sorted[p] - sorted[q] <= eps);
            if joins_previous {
                let c = component[prev_core.unwrap_or(p)];
                component[p] = c;
                component_first_input[c] = component_first_input[c].min(order[p]);
            } else {
                component[p] = component_first_input.len();
                component_first_input.push(order[p]);
            }
            prev_core = Some(p);
        }

        // Cluster ids in order of each component's first core point in the input
        let mut by_first: Vec<usize> = (0..component_first_input.len()).collect();
        by_first.sort_by_key(|&c| component_first_input[c]);
        let mut cluster_id = vec![0i64; by_first.len()];
        for (id, &c) in by_first.iter().enumerate() {
            cluster_id[c] = id as i64;
        }

        let nearest_core_left = scan_nearest_core(&sorted, &is_core, 0..n);
        let nearest_core_right = scan_nearest_core(&sorted, &is_core, (0..n).rev());

        let mut labels = vec![NOISE; n];
        for p in 0..n {
            let label = if is_core[p] {
                cluster_id[component[p]]
            } else {
                [nearest_core_left[p], nearest_core_right[p]]
                    .iter()
                    .flatten()
                    .filter(|&&q| (sorted[p] - sorted[q]).abs() <= eps)
                    .map(|&q| cluster_id[component[q]])
                    .min()
                    .unwrap_or(NOISE)
            };
            labels[order[p]] = label;
        }

        self.n_noise = labels.iter().filter(|&&l| l == NOISE).count();
        self.n_clusters_found = by_first.len();
        self.labels = Some(labels);
        Ok(self)
    }

    pub fn labels(&self) -> Option<&[i64]> {
        self.labels.as_deref()
    }

    /// Number of clusters found (excluding noise)
    pub fn n_clusters_found(&self) -> usize {
        self.n_clusters_found
    }

    pub fn n_noise(&self) -> usize {
        self.n_noise
    }

    pub fn is_fitted(&self) -> bool {
        self.labels.is_some()
    }
}

/// For each sorted position, the closest core position met while walking
/// `positions` (excluding the position itself)
fn scan_nearest_core(
    sorted: &[f64],
    is_core: &[bool],
    positions: impl Iterator<Item = usize>,
) -> Vec<Option<usize>> {
    let mut nearest = vec![None; sorted.len()];
    let mut last_core = None;
    for p in positions {
        nearest[p] = last_core;
        if is_core[p] {
            last_core = Some(p);
        }
    }
    nearest
}
