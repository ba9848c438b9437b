//! Seeded train/test partitioning

use crate::error::{JobPowerError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Rows of one train/test partition, with the original row indices
#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit<T> {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<T>,
    pub y_test: Array1<T>,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Shuffled row indices split into (train, test).
///
/// The first `round(test_fraction * n)` shuffled indices form the test set.
pub fn split_indices(n_samples: usize, test_fraction: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(JobPowerError::InvalidParameter {
            name: "test_fraction".into(),
            value: test_fraction.to_string(),
            reason: "must lie in (0, 1)".into(),
        });
    }
    let n_test = (test_fraction * n_samples as f64).round() as usize;
    if n_test == 0 || n_test >= n_samples {
        return Err(JobPowerError::InvalidInput(format!(
            "test_fraction {} of {} rows leaves an empty train or test set",
            test_fraction, n_samples
        )));
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok((train, indices))
}

/// Partition `x` and `y` with the same shuffled row order
pub fn train_test_split<T: Clone>(
    x: &Array2<f64>,
    y: &Array1<T>,
    test_fraction: f64,
    seed: u64,
) -> Result<TrainTestSplit<T>> {
    if x.nrows() != y.len() {
        return Err(JobPowerError::shape_mismatch(x.nrows(), y.len(), "n_samples"));
    }
    let (train_indices, test_indices) = split_indices(x.nrows(), test_fraction, seed)?;
    Ok(TrainTestSplit {
        x_train: x.select(Axis(0), &train_indices),
        x_test: x.select(Axis(0), &test_indices),
        y_train: y.select(Axis(0), &train_indices),
        y_test: y.select(Axis(0), &test_indices),
        train_indices,
        test_indices,
    })
}
