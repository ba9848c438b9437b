//! Jobpower - power tiers and model benchmarks for HPC job traces
//!
//! This crate loads per-job power time series, derives per-node power,
//! groups jobs into power tiers and benchmarks regression and classification
//! models that predict power from allocation features.
//!
//! # Modules
//!
//! ## Data
//! - [`data`] - Job file loading into a typed [`data::JobTable`]
//! - [`power`] - Empty-series filter, average and per-node power
//!
//! ## Analysis
//! - [`clustering`] - Elbow-tuned K-Means and DBSCAN power tiers
//! - [`features`] - Categorical encoding, correlation and feature selection
//! - [`preprocessing`] - Min-max scaling and seeded train/test splits
//!
//! ## Modelling
//! - [`training`] - Estimators behind a common trait
//! - [`evaluation`] - Per-model metrics with failure isolation
//!
//! ## Services
//! - [`pipeline`] - End-to-end stage sequence
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;
pub mod config;

// Data
pub mod data;
pub mod power;

// Analysis
pub mod clustering;
pub mod features;
pub mod preprocessing;

// Modelling
pub mod training;
pub mod evaluation;

// Services
pub mod pipeline;
pub mod cli;

pub use error::{JobPowerError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{FitStage, JobPowerError, ModelFitError, Result};

    // Configuration
    pub use crate::config::{ClusterMethod, PipelineConfig, ZeroNodePolicy};

    // Data
    pub use crate::data::{JobLoader, JobRecord, JobTable};
    pub use crate::power::{
        compute_average_power, compute_normalized_power, filter_empty_power_series, FilterReport, PowerSummary,
    };

    // Clustering
    pub use crate::clustering::{ClusterAssignment, Clusterer, Dbscan, ElbowKMeans, KMeans};

    // Features
    pub use crate::features::{
        correlation_matrix, encode_categorical, select_features, CorrelationMatrix, FeatureFrame, FeatureSelection,
        JobFeature,
    };

    // Preprocessing
    pub use crate::preprocessing::{min_max_scale, train_test_split, MinMaxScaler, TrainTestSplit};

    // Training
    pub use crate::training::{classification_roster, regression_roster, Estimator, Task};

    // Evaluation
    pub use crate::evaluation::{EvaluationHarness, EvaluationReport, TaskMetrics};

    // Pipeline
    pub use crate::pipeline::{Pipeline, PipelineOutcome};
}
