//! Power-tier clustering
//!
//! Two interchangeable strategies label every job from its per-node power:
//! - [`Dbscan`]: density based, no preset cluster count, `-1` marks noise
//! - [`ElbowKMeans`]: k-means with K picked at the knee of the inertia curve
//!
//! K-Means tiers are numbered by centroid, so tier 0 is the lowest-power tier.

mod dbscan;
mod elbow;
mod kmeans;

pub use dbscan::{Dbscan, NOISE};
pub use elbow::{find_knee, ElbowCurve, ElbowFit, ElbowKMeans};
pub use kmeans::KMeans;

use crate::error::{JobPowerError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// Labels produced by one clustering strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub method: String,
    pub labels: Vec<i64>,
    /// K picked by the elbow search, or the number of density clusters found
    pub chosen_k: usize,
    pub n_noise: usize,
    pub inertia: Option<f64>,
    pub elbow: Option<ElbowCurve>,
}

impl ClusterAssignment {
    /// Number of jobs per label
    pub fn sizes(&self) -> BTreeMap<i64, usize> {
        cluster_sizes(&self.labels)
    }
}

/// Fit a single numeric column and emit one integer label per value
pub trait Clusterer {
    fn name(&self) -> &str;

    fn cluster(&self, values: &[f64], k_range: RangeInclusive<usize>) -> Result<ClusterAssignment>;
}

impl Clusterer for Dbscan {
    fn name(&self) -> &str {
        "dbscan"
    }

    /// `k_range` is ignored: DBSCAN decides the cluster count itself
    fn cluster(&self, values: &[f64], _k_range: RangeInclusive<usize>) -> Result<ClusterAssignment> {
        let mut model = self.clone();
        model.fit(values)?;
        let labels = model.labels().ok_or(JobPowerError::ModelNotFitted)?.to_vec();
        Ok(ClusterAssignment {
            method: self.name().to_string(),
            labels,
            chosen_k: model.n_clusters_found(),
            n_noise: model.n_noise(),
            inertia: None,
            elbow: None,
        })
    }
}

impl Clusterer for ElbowKMeans {
    fn name(&self) -> &str {
        "kmeans"
    }

    fn cluster(&self, values: &[f64], k_range: RangeInclusive<usize>) -> Result<ClusterAssignment> {
        let search = ElbowKMeans {
            k_range,
            ..self.clone()
        };
        let fit = search.search(&column_matrix(values)?)?;
        let labels = fit
            .model
            .ordered_labels()?
            .into_iter()
            .map(|l| l as i64)
            .collect();
        Ok(ClusterAssignment {
            method: self.name().to_string(),
            labels,
            chosen_k: fit.chosen_k,
            n_noise: 0,
            inertia: fit.model.inertia(),
            elbow: Some(fit.curve),
        })
    }
}

/// View a slice as an n x 1 sample matrix
pub fn column_matrix(values: &[f64]) -> Result<Array2<f64>> {
    if values.is_empty() {
        return Err(JobPowerError::InvalidInput("cannot cluster an empty column".into()));
    }
    Ok(Array2::from_shape_vec((values.len(), 1), values.to_vec())?)
}

/// Number of members of each label, noise included
pub fn cluster_sizes(labels: &[i64]) -> BTreeMap<i64, usize> {
    let mut sizes = BTreeMap::new();
    for &l in labels {
        *sizes.entry(l).or_insert(0) += 1;
    }
    sizes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_groups() -> Vec<f64> {
        let mut values = Vec::new();
        for center in [100.0, 400.0, 900.0] {
            for i in 0..20 {
                values.push(center + (i % 5) as f64 * 0.5);
            }
        }
        values
    }

    #[test]
    fn test_elbow_selects_three_groups() {
        let assignment = ElbowKMeans::default().cluster(&three_groups(), 1..=10).unwrap();
        assert_eq!(assignment.chosen_k, 3);
        let sizes = assignment.sizes();
        assert_eq!(sizes.len(), 3);
        assert!(sizes.values().all(|&n| n == 20));
        // Tiers are ordered by power
        assert_eq!(assignment.labels[0], 0);
        assert_eq!(assignment.labels[25], 1);
        assert_eq!(assignment.labels[59], 2);
    }

    #[test]
    fn test_kmeans_isolates_outlier_tier() {
        let values = [100.0, 102.0, 150.0, 155.0, 98.0, 300.0, 101.0, 147.5, 99.0, 103.0];
        let assignment = ElbowKMeans::default().cluster(&values, 2..=2).unwrap();
        assert_eq!(assignment.chosen_k, 2);
        for (i, &label) in assignment.labels.iter().enumerate() {
            if i == 5 {
                assert_eq!(label, 1);
            } else {
                assert_eq!(label, 0);
            }
        }
    }

    #[test]
    fn test_dbscan_clusterer_reports_noise() {
        let values = [1.0, 1.1, 1.2, 5.0, 5.1, 5.2, 40.0];
        let assignment = Dbscan::new(0.5, 2).cluster(&values, 1..=10).unwrap();
        assert_eq!(assignment.chosen_k, 2);
        assert_eq!(assignment.n_noise, 1);
        assert_eq!(assignment.labels[6], NOISE);
        assert!(assignment.elbow.is_none());
    }

    #[test]
    fn test_strategies_are_interchangeable() {
        let strategies: Vec<Box<dyn Clusterer>> =
            vec![Box::new(Dbscan::new(10.0, 3)), Box::new(ElbowKMeans::default())];
        let values = three_groups();
        for s in &strategies {
            let a = s.cluster(&values, 1..=6).unwrap();
            assert_eq!(a.labels.len(), values.len());
            assert_eq!(a.method, s.name());
        }
    }

    #[test]
    fn test_empty_column_rejected() {
        assert!(ElbowKMeans::default().cluster(&[], 1..=3).is_err());
    }
}
