//! Estimators benchmarked by the evaluation harness
//!
//! Every model implements [`Estimator`]. Classifiers take cluster labels as
//! `f64` values and predict one of the labels seen during fit.
//!
//! - Linear models: OLS, Ridge, Lasso, multinomial logistic regression
//! - CART decision trees and bagged random forests
//! - K-Nearest Neighbors
//! - Gaussian Naive Bayes

pub mod decision_tree;
pub mod knn;
pub mod linear_models;
pub mod naive_bayes;
pub mod random_forest;

pub use decision_tree::{DecisionTree, TreeNode};
pub use knn::Knn;
pub use linear_models::{LassoRegression, LinearRegression, LogisticRegression, RidgeRegression};
pub use naive_bayes::GaussianNaiveBayes;
pub use random_forest::{MaxFeatures, RandomForest};

use crate::error::{JobPowerError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of target a model predicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    Regression,
    Classification,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Regression => write!(f, "regression"),
            Task::Classification => write!(f, "classification"),
        }
    }
}

/// A model the harness can fit and query
pub trait Estimator: Send {
    fn name(&self) -> &str;

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

/// Regression models, in report order
pub fn regression_roster(seed: u64) -> Vec<Box<dyn Estimator>> {
    vec![
        Box::new(LinearRegression::new()),
        Box::new(RidgeRegression::new(1.0)),
        Box::new(LassoRegression::new(1.0)),
        Box::new(DecisionTree::new(Task::Regression).with_random_state(seed)),
        Box::new(RandomForest::new(Task::Regression).with_random_state(seed)),
        Box::new(Knn::new(Task::Regression, 5)),
    ]
}

/// Classification models, in report order
pub fn classification_roster(seed: u64) -> Vec<Box<dyn Estimator>> {
    vec![
        Box::new(LogisticRegression::new()),
        Box::new(DecisionTree::new(Task::Classification).with_random_state(seed)),
        Box::new(RandomForest::new(Task::Classification).with_random_state(seed)),
        Box::new(Knn::new(Task::Classification, 5)),
        Box::new(GaussianNaiveBayes::new()),
    ]
}

/// Reject empty, misaligned or non-finite training data
pub(crate) fn check_training_data(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(JobPowerError::Training("no training samples".into()));
    }
    if x.nrows() != y.len() {
        return Err(JobPowerError::shape_mismatch(x.nrows(), y.len(), "n_samples"));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(JobPowerError::InvalidInput("training data contains non-finite values".into()));
    }
    Ok(())
}

pub(crate) fn check_features(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(JobPowerError::shape_mismatch(expected, x.ncols(), "n_features"));
    }
    Ok(())
}

/// Distinct labels in ascending order
pub(crate) fn class_labels(y: &Array1<f64>) -> Vec<f64> {
    let mut classes: Vec<f64> = y.to_vec();
    classes.sort_by(f64::total_cmp);
    classes.dedup();
    classes
}

/// Position of `label` in the sorted class list
pub(crate) fn class_index(classes: &[f64], label: f64) -> Option<usize> {
    classes.binary_search_by(|c| c.total_cmp(&label)).ok()
}

/// Most frequent label; ties go to the smallest label
pub(crate) fn majority_label(labels: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut sorted: Vec<f64> = labels.into_iter().collect();
    sorted.sort_by(f64::total_cmp);
    let mut best: Option<(f64, usize)> = None;
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i;
        while j < sorted.len() && sorted[j] == sorted[i] {
            j += 1;
        }
        if best.map_or(true, |(_, n)| j - i > n) {
            best = Some((sorted[i], j - i));
        }
        i = j;
    }
    best.map(|(label, _)| label)
}
