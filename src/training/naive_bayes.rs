//! Gaussian Naive Bayes classifier

use super::{check_features, check_training_data, class_index, class_labels, Estimator};
use crate::error::{JobPowerError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Gaussian Naive Bayes.
///
/// Every feature is modelled as an independent normal per class. A small
/// fraction of the largest feature variance is added to all variances so
/// constant features stay usable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    pub var_smoothing: f64,
    classes: Vec<f64>,
    log_priors: Option<Array1<f64>>,
    means: Option<Array2<f64>>,
    variances: Option<Array2<f64>>,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            var_smoothing: 1e-9,
            classes: Vec::new(),
            log_priors: None,
            means: None,
            variances: None,
        }
    }

    pub fn with_var_smoothing(mut self, var_smoothing: f64) -> Self {
        self.var_smoothing = var_smoothing;
        self
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    fn joint_log_likelihood(&self, row: ArrayView1<f64>) -> Result<Vec<f64>> {
        let priors = self.log_priors.as_ref().ok_or(JobPowerError::ModelNotFitted)?;
        let means = self.means.as_ref().ok_or(JobPowerError::ModelNotFitted)?;
        let vars = self.variances.as_ref().ok_or(JobPowerError::ModelNotFitted)?;

        Ok((0..self.classes.len())
            .map(|c| {
                let ll: f64 = row
                    .iter()
                    .zip(means.row(c).iter().zip(vars.row(c).iter()))
                    .map(|(&x, (&mu, &var))| {
                        -0.5 * (2.0 * std::f64::consts::PI * var).ln() - (x - mu).powi(2) / (2.0 * var)
                    })
                    .sum();
                priors[c] + ll
            })
            .collect())
    }
}

impl Estimator for GaussianNaiveBayes {
    fn name(&self) -> &str {
        "Gaussian Naive Bayes"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y)?;
        let classes = class_labels(y);
        let (n_samples, n_features) = x.dim();
        let n_classes = classes.len();

        let mut counts = vec![0usize; n_classes];
        let mut means = Array2::<f64>::zeros((n_classes, n_features));
        for (row, &label) in x.rows().into_iter().zip(y.iter()) {
            let c = class_index(&classes, label)
                .ok_or_else(|| JobPowerError::Training("label outside the fitted classes".into()))?;
            counts[c] += 1;
            let mut m = means.row_mut(c);
            m += &row;
        }
        for (c, &n) in counts.iter().enumerate() {
            means.row_mut(c).mapv_inplace(|v| v / n as f64);
        }

        let mut variances = Array2::<f64>::zeros((n_classes, n_features));
        for (row, &label) in x.rows().into_iter().zip(y.iter()) {
            if let Some(c) = class_index(&classes, label) {
                for j in 0..n_features {
                    variances[[c, j]] += (row[j] - means[[c, j]]).powi(2);
                }
            }
        }
        for (c, &n) in counts.iter().enumerate() {
            variances.row_mut(c).mapv_inplace(|v| v / n as f64);
        }

        let max_var = x
            .var_axis(Axis(0), 0.0)
            .iter()
            .copied()
            .fold(0.0f64, f64::max);
        let epsilon = (self.var_smoothing * max_var).max(f64::MIN_POSITIVE);
        variances.mapv_inplace(|v| v + epsilon);

        let log_priors = counts
            .iter()
            .map(|&n| (n as f64 / n_samples as f64).ln())
            .collect::<Array1<f64>>();

        self.classes = classes;
        self.log_priors = Some(log_priors);
        self.means = Some(means);
        self.variances = Some(variances);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let means = self.means.as_ref().ok_or(JobPowerError::ModelNotFitted)?;
        check_features(means.ncols(), x)?;

        x.rows()
            .into_iter()
            .map(|row| {
                let jll = self.joint_log_likelihood(row)?;
                let best = jll
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
                Ok(self.classes[best.0])
            })
            .collect::<Result<Vec<f64>>>()
            .map(Array1::from_vec)
    }
}
