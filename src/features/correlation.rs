//! Pearson correlation and correlation-driven feature selection

use super::{FeatureFrame, JobFeature};
use crate::error::{JobPowerError, Result};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Pearson r of two equally long columns.
///
/// A column with zero variance has no defined correlation; it is reported as
/// 0.0.
pub fn pearson(x: ArrayView1<f64>, y: ArrayView1<f64>) -> f64 {
    let n = x.len();
    if n == 0 || n != y.len() {
        return 0.0;
    }
    let x_mean = x.sum() / n as f64;
    let y_mean = y.sum() / n as f64;

    let mut cov = 0.0;
    let mut x_var = 0.0;
    let mut y_var = 0.0;
    for (&a, &b) in x.iter().zip(y.iter()) {
        let dx = a - x_mean;
        let dy = b - y_mean;
        cov += dx * dy;
        x_var += dx * dx;
        y_var += dy * dy;
    }

    if x_var <= 0.0 || y_var <= 0.0 {
        return 0.0;
    }
    (cov / (x_var.sqrt() * y_var.sqrt())).clamp(-1.0, 1.0)
}

/// Square, symmetric correlation matrix over features followed by targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub names: Vec<String>,
    pub values: Array2<f64>,
}

impl CorrelationMatrix {
    fn index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        Some(self.values[[self.index(a)?, self.index(b)?]])
    }

    /// Correlations of every column against `name`, in matrix order
    pub fn against(&self, name: &str) -> Option<Vec<(&str, f64)>> {
        let j = self.index(name)?;
        Some(
            self.names
                .iter()
                .enumerate()
                .map(|(i, n)| (n.as_str(), self.values[[i, j]]))
                .collect(),
        )
    }
}

/// Correlate every pair of columns drawn from `frame` and `targets`
pub fn correlation_matrix(frame: &FeatureFrame, targets: &[(&str, &[f64])]) -> Result<CorrelationMatrix> {
    let n_rows = frame.n_rows();
    for (name, values) in targets {
        if values.len() != n_rows {
            return Err(JobPowerError::shape_mismatch(n_rows, values.len(), name));
        }
        if frame.names().iter().any(|n| n == name) {
            return Err(JobPowerError::Schema(format!(
                "target '{}' is also a feature column",
                name
            )));
        }
    }

    let mut columns: Vec<ArrayView1<f64>> = (0..frame.n_cols()).map(|j| frame.data().column(j)).collect();
    columns.extend(targets.iter().map(|(_, v)| ArrayView1::from(*v)));
    let mut names: Vec<String> = frame.names().to_vec();
    names.extend(targets.iter().map(|(n, _)| n.to_string()));

    let m = columns.len();
    let mut values = Array2::<f64>::zeros((m, m));
    for i in 0..m {
        values[[i, i]] = 1.0;
        for j in (i + 1)..m {
            let r = pearson(columns[i], columns[j]);
            values[[i, j]] = r;
            values[[j, i]] = r;
        }
    }

    debug!(columns = m, rows = n_rows, "Computed correlation matrix");
    Ok(CorrelationMatrix { names, values })
}

/// How the model inputs are chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSelection {
    /// Use exactly these features
    Manual(Vec<String>),
    /// Keep features whose |r| exceeds the threshold against any target
    Threshold(f64),
}

impl FeatureSelection {
    /// A configured manual list wins over the threshold
    pub fn from_options(feature_set: Option<&[String]>, threshold: f64) -> Self {
        match feature_set {
            Some(names) => FeatureSelection::Manual(names.to_vec()),
            None => FeatureSelection::Threshold(threshold),
        }
    }
}

/// Pick the feature columns used for modelling
pub fn select_features(
    matrix: &CorrelationMatrix,
    selection: &FeatureSelection,
    targets: &[&str],
) -> Result<Vec<String>> {
    let selected: Vec<String> = match selection {
        FeatureSelection::Manual(names) => {
            let mut selected: Vec<String> = Vec::with_capacity(names.len());
            for name in names {
                let feature: JobFeature = name.parse()?;
                let name = feature.name().to_string();
                if !selected.contains(&name) {
                    selected.push(name);
                }
            }
            selected
        }
        FeatureSelection::Threshold(t) => {
            let target_idx = targets
                .iter()
                .map(|t| {
                    matrix
                        .index(t)
                        .ok_or_else(|| JobPowerError::Schema(format!("target '{}' not in matrix", t)))
                })
                .collect::<Result<Vec<_>>>()?;
            matrix
                .names
                .iter()
                .enumerate()
                .filter(|(i, _)| !target_idx.contains(i))
                .filter(|(i, _)| target_idx.iter().any(|&j| matrix.values[[*i, j]].abs() > *t))
                .map(|(_, n)| n.clone())
                .collect()
        }
    };

    if selected.is_empty() {
        return Err(JobPowerError::InvalidInput(format!(
            "no features selected with {:?}",
            selection
        )));
    }
    info!(features = ?selected, "Selected model features");
    Ok(selected)
}
