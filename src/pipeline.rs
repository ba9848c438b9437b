//! End-to-end job power workflow
//!
//! Each stage takes the [`JobTable`] by value and hands a new one to the next:
//! filter, average, normalize, cluster, subsample, encode, select, scale,
//! split, then both model rosters.

use crate::clustering::{ClusterAssignment, Clusterer, Dbscan, ElbowKMeans};
use crate::config::{ClusterMethod, PipelineConfig};
use crate::data::{JobLoader, JobTable};
use crate::error::Result;
use crate::evaluation::{EvaluationHarness, EvaluationReport};
use crate::features::{correlation_matrix, select_features, CategoryEncoder, CorrelationMatrix, FeatureSelection, JobFeature};
use crate::power::{
    compute_average_power, compute_normalized_power, filter_empty_power_series, FilterReport, PowerSummary,
};
use crate::preprocessing::{min_max_scale, train_test_split, MinMaxScaler};
use crate::training::{classification_roster, regression_roster, Estimator, Task};
use ndarray::Array1;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Regression target column
pub const REGRESSION_TARGET: &str = "norm_average_power_consumption";
/// Classification target column
pub const CLASSIFICATION_TARGET: &str = "cluster";

/// Everything a pipeline run produced
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub filter: FilterReport,
    pub power: PowerSummary,
    pub kmeans: ClusterAssignment,
    pub dbscan: ClusterAssignment,
    /// Rows used for modelling, with every derived column
    #[serde(skip)]
    pub table: JobTable,
    pub encoder: CategoryEncoder,
    pub correlation: CorrelationMatrix,
    pub selected_features: Vec<String>,
    pub scaler: MinMaxScaler,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub regression: EvaluationReport,
    pub classification: EvaluationReport,
}

/// Pipeline driver
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load a job file and run every stage on it
    pub fn run_file(&self, path: impl AsRef<Path>) -> Result<PipelineOutcome> {
        let table = JobLoader::new().load(path)?;
        self.run(table)
    }

    /// Run with the standard model rosters
    pub fn run(&self, table: JobTable) -> Result<PipelineOutcome> {
        let seed = self.config.random_seed;
        self.run_with_rosters(table, regression_roster(seed), classification_roster(seed))
    }

    /// Run with caller-supplied rosters
    pub fn run_with_rosters(
        &self,
        table: JobTable,
        mut regressors: Vec<Box<dyn Estimator>>,
        mut classifiers: Vec<Box<dyn Estimator>>,
    ) -> Result<PipelineOutcome> {
        let start = Instant::now();
        let config = &self.config;
        info!(jobs = table.len(), seed = config.random_seed, "Starting pipeline");

        // Power features
        let (table, filter) = filter_empty_power_series(table)?;
        let table = compute_average_power(table)?;
        let table = compute_normalized_power(table, config.zero_node_policy)?;
        let power = PowerSummary::from_table(&table)?;

        // Power tiers
        let (kmeans, dbscan) = self.cluster(table.norm_average_power_consumption()?)?;
        let labels = match config.cluster_method {
            ClusterMethod::KMeans => kmeans.labels.clone(),
            ClusterMethod::Dbscan => dbscan.labels.clone(),
        };
        let table = table.with_cluster(labels)?;

        let table = table.subsample(config.subsampling_ratio)?;
        debug!(rows = table.len(), ratio = config.subsampling_ratio, "Subsampled table");

        // Features
        let mut encoder = CategoryEncoder::new();
        let frame = encoder.fit_transform(&table, &JobFeature::ALL)?;

        let y_reg: Vec<f64> = table.norm_average_power_consumption()?.to_vec();
        let y_cls: Vec<f64> = table.cluster()?.iter().map(|&c| c as f64).collect();

        let correlation = correlation_matrix(
            &frame,
            &[(REGRESSION_TARGET, y_reg.as_slice()), (CLASSIFICATION_TARGET, y_cls.as_slice())],
        )?;
        let selection = FeatureSelection::from_options(config.feature_set.as_deref(), config.correlation_threshold);
        let selected_features = select_features(
            &correlation,
            &selection,
            &[REGRESSION_TARGET, CLASSIFICATION_TARGET],
        )?;

        let (x, scaler) = min_max_scale(&frame, &selected_features)?;

        // Both tasks share one split: same seed, same row count
        let reg_split = train_test_split(&x, &Array1::from_vec(y_reg), config.test_fraction, config.random_seed)?;
        let cls_split = train_test_split(&x, &Array1::from_vec(y_cls), config.test_fraction, config.random_seed)?;
        info!(
            train = reg_split.train_indices.len(),
            test = reg_split.test_indices.len(),
            features = selected_features.len(),
            "Prepared model inputs"
        );

        let regression = EvaluationHarness::new(Task::Regression, REGRESSION_TARGET).evaluate(&mut regressors, &reg_split);
        let classification =
            EvaluationHarness::new(Task::Classification, CLASSIFICATION_TARGET).evaluate(&mut classifiers, &cls_split);

        info!(secs = start.elapsed().as_secs_f64(), "Pipeline finished");

        Ok(PipelineOutcome {
            filter,
            power,
            kmeans,
            dbscan,
            table,
            encoder,
            correlation,
            selected_features,
            scaler,
            train_indices: reg_split.train_indices,
            test_indices: reg_split.test_indices,
            regression,
            classification,
        })
    }

    /// Label every job with both clustering strategies
    pub fn cluster(&self, values: &[f64]) -> Result<(ClusterAssignment, ClusterAssignment)> {
        let config = &self.config;
        let k_range = config.k_min..=config.k_max;

        let kmeans = ElbowKMeans::new(k_range.clone())
            .with_max_iter(config.kmeans_max_iter)
            .with_n_init(config.kmeans_n_init)
            .with_random_state(config.random_seed)
            .cluster(values, k_range.clone())?;
        info!(k = kmeans.chosen_k, sizes = ?kmeans.sizes(), "K-Means tiers");

        let dbscan = Dbscan::new(config.dbscan_eps, config.dbscan_min_samples).cluster(values, k_range)?;
        info!(
            clusters = dbscan.chosen_k,
            noise = dbscan.n_noise,
            sizes = ?dbscan.sizes(),
            "DBSCAN tiers"
        );

        Ok((kmeans, dbscan))
    }
}
