//! Pipeline configuration

use crate::error::{JobPowerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What to do with jobs that report zero allocated nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroNodePolicy {
    /// Abort the pipeline with a division-by-zero error
    Error,
    /// Drop the offending rows and continue
    Exclude,
}

/// Which clustering result feeds the classification target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMethod {
    #[serde(rename = "kmeans")]
    KMeans,
    Dbscan,
}

/// Configuration for the end-to-end pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Smallest K tried by the elbow search
    pub k_min: usize,
    /// Largest K tried by the elbow search
    pub k_max: usize,

    /// Fraction of rows held out for testing
    pub test_fraction: f64,

    /// Keep only the first fraction of rows before splitting
    pub subsampling_ratio: f64,

    /// Manual feature list; overrides correlation selection when set
    pub feature_set: Option<Vec<String>>,

    /// Minimum absolute Pearson r against any target for automatic selection
    pub correlation_threshold: f64,

    /// Seed for clustering initialization, model randomness and the split
    pub random_seed: u64,

    pub dbscan_eps: f64,
    pub dbscan_min_samples: usize,

    pub kmeans_max_iter: usize,
    pub kmeans_n_init: usize,

    pub zero_node_policy: ZeroNodePolicy,

    pub cluster_method: ClusterMethod,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            k_min: 1,
            k_max: 10,
            test_fraction: 0.2,
            subsampling_ratio: 1.0,
            feature_set: None,
            correlation_threshold: 0.1,
            random_seed: 42,
            dbscan_eps: 0.5,
            dbscan_min_samples: 5,
            kmeans_max_iter: 300,
            kmeans_n_init: 10,
            zero_node_policy: ZeroNodePolicy::Error,
            cluster_method: ClusterMethod::KMeans,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            JobPowerError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_k_range(mut self, k_min: usize, k_max: usize) -> Self {
        self.k_min = k_min;
        self.k_max = k_max;
        self
    }

    pub fn with_test_fraction(mut self, fraction: f64) -> Self {
        self.test_fraction = fraction;
        self
    }

    pub fn with_subsampling_ratio(mut self, ratio: f64) -> Self {
        self.subsampling_ratio = ratio;
        self
    }

    pub fn with_feature_set(mut self, features: Vec<String>) -> Self {
        self.feature_set = Some(features);
        self
    }

    pub fn with_correlation_threshold(mut self, threshold: f64) -> Self {
        self.correlation_threshold = threshold;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn with_dbscan(mut self, eps: f64, min_samples: usize) -> Self {
        self.dbscan_eps = eps;
        self.dbscan_min_samples = min_samples;
        self
    }

    pub fn with_zero_node_policy(mut self, policy: ZeroNodePolicy) -> Self {
        self.zero_node_policy = policy;
        self
    }

    pub fn with_cluster_method(mut self, method: ClusterMethod) -> Self {
        self.cluster_method = method;
        self
    }

    /// Check every option against its allowed range
    pub fn validate(&self) -> Result<()> {
        if self.k_min == 0 || self.k_min > self.k_max {
            return Err(JobPowerError::Config(format!(
                "k range must satisfy 1 <= k_min <= k_max, got {}..={}",
                self.k_min, self.k_max
            )));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(JobPowerError::Config(format!(
                "test_fraction must lie in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if !(self.subsampling_ratio > 0.0 && self.subsampling_ratio <= 1.0) {
            return Err(JobPowerError::Config(format!(
                "subsampling_ratio must lie in (0, 1], got {}",
                self.subsampling_ratio
            )));
        }
        if !(self.dbscan_eps > 0.0 && self.dbscan_eps.is_finite()) {
            return Err(JobPowerError::Config(format!(
                "dbscan_eps must be a positive number, got {}",
                self.dbscan_eps
            )));
        }
        if self.dbscan_min_samples == 0 {
            return Err(JobPowerError::Config("dbscan_min_samples must be at least 1".into()));
        }
        if self.kmeans_max_iter == 0 || self.kmeans_n_init == 0 {
            return Err(JobPowerError::Config(
                "kmeans_max_iter and kmeans_n_init must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.correlation_threshold) {
            return Err(JobPowerError::Config(format!(
                "correlation_threshold must lie in [0, 1], got {}",
                self.correlation_threshold
            )));
        }
        if let Some(features) = &self.feature_set {
            if features.is_empty() {
                return Err(JobPowerError::Config("feature_set must not be empty".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_ranges() {
        assert!(PipelineConfig::new().with_k_range(5, 2).validate().is_err());
        assert!(PipelineConfig::new().with_k_range(0, 4).validate().is_err());
        assert!(PipelineConfig::new().with_test_fraction(1.0).validate().is_err());
        assert!(PipelineConfig::new().with_subsampling_ratio(0.0).validate().is_err());
        assert!(PipelineConfig::new().with_subsampling_ratio(1.0).validate().is_ok());
        assert!(PipelineConfig::new().with_feature_set(vec![]).validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"k_max": 6, "zero_node_policy": "exclude"}"#).unwrap();
        assert_eq!(config.k_max, 6);
        assert_eq!(config.k_min, 1);
        assert_eq!(config.zero_node_policy, ZeroNodePolicy::Exclude);
        assert_eq!(config.cluster_method, ClusterMethod::KMeans);
    }

    #[test]
    fn test_from_json_file() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), r#"{"random_seed": 7, "feature_set": ["qos", "run_time"]}"#).unwrap();
        let config = PipelineConfig::from_json_file(tmp.path()).unwrap();
        assert_eq!(config.random_seed, 7);
        assert_eq!(config.feature_set.unwrap(), vec!["qos".to_string(), "run_time".to_string()]);
    }
}
