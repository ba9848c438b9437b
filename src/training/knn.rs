//! K-Nearest Neighbors on Euclidean distance

use super::{check_features, check_training_data, majority_label, Estimator, Task};
use crate::error::{JobPowerError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Brute-force k-nearest-neighbors.
///
/// Regression averages the targets of the `k` nearest training rows;
/// classification takes their majority label. Equal distances are broken by
/// training row order. `k` is capped at the number of training rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Knn {
    pub task: Task,
    pub k: usize,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
}

impl Knn {
    pub fn new(task: Task, k: usize) -> Self {
        Self {
            task,
            k: k.max(1),
            x_train: None,
            y_train: None,
        }
    }

    fn neighbours(&self, x_train: &Array2<f64>, row: ArrayView1<f64>) -> Vec<usize> {
        let mut dists: Vec<(f64, usize)> = x_train
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, t)| {
                let d: f64 = t.iter().zip(row.iter()).map(|(a, b)| (a - b).powi(2)).sum();
                (d, i)
            })
            .collect();
        let k = self.k.min(dists.len());
        let by_distance = |a: &(f64, usize), b: &(f64, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
        if k < dists.len() {
            dists.select_nth_unstable_by(k - 1, by_distance);
            dists.truncate(k);
        }
        dists.sort_by(by_distance);
        dists.into_iter().map(|(_, i)| i).collect()
    }
}

impl Estimator for Knn {
    fn name(&self) -> &str {
        "K-Nearest Neighbors"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y)?;
        self.x_train = Some(x.clone());
        self.y_train = Some(y.clone());
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let x_train = self.x_train.as_ref().ok_or(JobPowerError::ModelNotFitted)?;
        let y_train = self.y_train.as_ref().ok_or(JobPowerError::ModelNotFitted)?;
        check_features(x_train.ncols(), x)?;

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let idx = self.neighbours(x_train, x.row(i));
                let targets = idx.iter().map(|&j| y_train[j]);
                match self.task {
                    Task::Regression => targets.sum::<f64>() / idx.len() as f64,
                    Task::Classification => majority_label(targets).unwrap_or(f64::NAN),
                }
            })
            .collect();
        Ok(Array1::from_vec(predictions))
    }
}
