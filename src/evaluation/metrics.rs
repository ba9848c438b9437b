//! Regression and classification scores

use crate::error::{JobPowerError, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

fn check_pair(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(JobPowerError::shape_mismatch(y_true.len(), y_pred.len(), "n_predictions"));
    }
    if y_true.is_empty() {
        return Err(JobPowerError::InvalidInput("cannot score an empty test set".into()));
    }
    Ok(())
}

/// Scores of a regression model on held-out rows
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mae: f64,
    /// Mean absolute percentage error as a fraction (0.1 = 10%)
    pub mape: f64,
    pub mse: f64,
    pub r2: f64,
}

impl RegressionMetrics {
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Self> {
        check_pair(y_true, y_pred)?;
        let n = y_true.len() as f64;

        let mut abs_sum = 0.0;
        let mut pct_sum = 0.0;
        let mut sq_sum = 0.0;
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            let e = t - p;
            abs_sum += e.abs();
            pct_sum += e.abs() / t.abs().max(f64::EPSILON);
            sq_sum += e * e;
        }

        let mean = y_true.sum() / n;
        let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
        // A constant target has no variance to explain
        let r2 = if ss_tot > 0.0 {
            1.0 - sq_sum / ss_tot
        } else if sq_sum == 0.0 {
            1.0
        } else {
            0.0
        };

        Ok(Self {
            mae: abs_sum / n,
            mape: pct_sum / n,
            mse: sq_sum / n,
            r2,
        })
    }
}

/// Precision, recall and F1 of one label
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: i64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Occurrences of the label in the true targets
    pub support: usize,
}

/// Scores of a classifier on held-out rows.
///
/// Per-class scores cover every label that appears in either the true or the
/// predicted targets; a zero denominator scores 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub macro_f1: f64,
    pub per_class: Vec<ClassMetrics>,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl ClassificationMetrics {
    pub fn compute(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Self> {
        check_pair(y_true, y_pred)?;

        let mut labels: Vec<i64> = y_true
            .iter()
            .chain(y_pred.iter())
            .map(|&v| v.round() as i64)
            .collect();
        labels.sort_unstable();
        labels.dedup();

        let pairs: Vec<(i64, i64)> = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(&t, &p)| (t.round() as i64, p.round() as i64))
            .collect();

        let correct = pairs.iter().filter(|(t, p)| t == p).count();

        let per_class: Vec<ClassMetrics> = labels
            .iter()
            .map(|&label| {
                let tp = pairs.iter().filter(|&&(t, p)| t == label && p == label).count();
                let predicted = pairs.iter().filter(|&&(_, p)| p == label).count();
                let support = pairs.iter().filter(|&&(t, _)| t == label).count();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label,
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        let macro_f1 = per_class.iter().map(|c| c.f1).sum::<f64>() / per_class.len() as f64;

        Ok(Self {
            accuracy: ratio(correct, pairs.len()),
            macro_f1,
            per_class,
        })
    }
}

/// Scores of one model, by task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskMetrics {
    Regression(RegressionMetrics),
    Classification(ClassificationMetrics),
}

impl TaskMetrics {
    /// R² for regression, macro F1 for classification
    pub fn primary_score(&self) -> f64 {
        match self {
            TaskMetrics::Regression(m) => m.r2,
            TaskMetrics::Classification(m) => m.macro_f1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regression_metrics() {
        let y_true = array![100.0, 200.0, 300.0, 400.0];
        let y_pred = array![110.0, 190.0, 300.0, 400.0];
        let m = RegressionMetrics::compute(&y_true, &y_pred).unwrap();
        assert!((m.mae - 5.0).abs() < 1e-12);
        assert!((m.mse - 50.0).abs() < 1e-12);
        assert!((m.mape - (0.1 + 0.05) / 4.0).abs() < 1e-12);
        assert!((m.r2 - (1.0 - 200.0 / 50_000.0)).abs() < 1e-12);
    }

    #[test]
    fn test_r2_constant_target() {
        let y = array![3.0, 3.0, 3.0];
        assert_eq!(RegressionMetrics::compute(&y, &y).unwrap().r2, 1.0);
        let off = array![3.0, 3.5, 3.0];
        assert_eq!(RegressionMetrics::compute(&y, &off).unwrap().r2, 0.0);
    }

    #[test]
    fn test_mape_zero_target_is_finite() {
        let m = RegressionMetrics::compute(&array![0.0, 1.0], &array![0.0, 1.0]).unwrap();
        assert_eq!(m.mape, 0.0);
        let m = RegressionMetrics::compute(&array![0.0], &array![1e-20]).unwrap();
        assert!(m.mape.is_finite());
    }

    #[test]
    fn test_classification_metrics() {
        let y_true = array![0.0, 0.0, 1.0, 1.0, 2.0, 2.0];
        let y_pred = array![0.0, 1.0, 1.0, 1.0, 2.0, 0.0];
        let m = ClassificationMetrics::compute(&y_true, &y_pred).unwrap();
        assert!((m.accuracy - 4.0 / 6.0).abs() < 1e-12);

        let c1 = m.per_class.iter().find(|c| c.label == 1).unwrap();
        assert!((c1.precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(c1.recall, 1.0);
        assert_eq!(c1.support, 2);

        let expected_macro = m.per_class.iter().map(|c| c.f1).sum::<f64>() / 3.0;
        assert!((m.macro_f1 - expected_macro).abs() < 1e-12);
    }

    #[test]
    fn test_labels_only_predicted_count_in_macro_f1() {
        let y_true = array![0.0, 0.0];
        let y_pred = array![0.0, 5.0];
        let m = ClassificationMetrics::compute(&y_true, &y_pred).unwrap();
        assert_eq!(m.per_class.len(), 2);
        let c5 = m.per_class.iter().find(|c| c.label == 5).unwrap();
        assert_eq!((c5.precision, c5.recall, c5.f1, c5.support), (0.0, 0.0, 0.0, 0));
    }

    #[test]
    fn test_noise_label_is_a_class() {
        let y = array![-1.0, 0.0, -1.0];
        let m = ClassificationMetrics::compute(&y, &y).unwrap();
        assert_eq!(m.per_class[0].label, -1);
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.macro_f1, 1.0);
    }

    #[test]
    fn test_length_mismatch() {
        assert!(RegressionMetrics::compute(&array![1.0], &array![1.0, 2.0]).is_err());
        let empty = Array1::<f64>::zeros(0);
        assert!(ClassificationMetrics::compute(&empty, &empty).is_err());
    }
}
