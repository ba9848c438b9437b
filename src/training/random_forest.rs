//! Bagged ensemble of CART trees

use super::decision_tree::DecisionTree;
use super::{check_features, check_training_data, majority_label, Estimator, Task};
use crate::error::{JobPowerError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of features each split may consider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    Fraction(f64),
    Fixed(usize),
    All,
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        let m = match *self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n,
            MaxFeatures::All => n_features,
        };
        m.clamp(1, n_features.max(1))
    }
}

/// Random forest.
///
/// Each tree gets its own seed drawn up front from one `ChaCha8Rng`, so the
/// fitted forest does not depend on how rayon schedules the trees.
/// Regression averages the trees; classification takes a majority vote with
/// ties going to the smallest label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub task: Task,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub random_state: u64,
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForest {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            n_estimators: 100,
            max_depth: None,
            min_samples_leaf: 1,
            max_features: match task {
                Task::Regression => MaxFeatures::All,
                Task::Classification => MaxFeatures::Sqrt,
            },
            bootstrap: true,
            random_state: 42,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n.max(1);
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn fit_tree(&self, x: &Array2<f64>, y: &Array1<f64>, seed: u64, max_features: usize) -> Result<DecisionTree> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let n_samples = x.nrows();

        let mut tree = DecisionTree::new(self.task)
            .with_min_samples_leaf(self.min_samples_leaf)
            .with_max_features(max_features)
            .with_random_state(rng.gen());
        if let Some(d) = self.max_depth {
            tree = tree.with_max_depth(d);
        }

        if self.bootstrap {
            let sample: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
            let x_boot = x.select(Axis(0), &sample);
            let y_boot = y.select(Axis(0), &sample);
            tree.fit(&x_boot, &y_boot)?;
        } else {
            tree.fit(x, y)?;
        }
        Ok(tree)
    }
}

impl Estimator for RandomForest {
    fn name(&self) -> &str {
        "Random Forest"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y)?;
        let max_features = self.max_features.resolve(x.ncols());

        let mut seeder = ChaCha8Rng::seed_from_u64(self.random_state);
        let seeds: Vec<u64> = (0..self.n_estimators).map(|_| seeder.gen()).collect();

        let trees = seeds
            .into_par_iter()
            .map(|seed| self.fit_tree(x, y, seed, max_features))
            .collect::<Result<Vec<_>>>()?;

        debug!(n_trees = trees.len(), max_features, task = %self.task, "Fitted random forest");
        self.trees = trees;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(JobPowerError::ModelNotFitted);
        }
        check_features(self.n_features, x)?;

        let per_tree = self
            .trees
            .par_iter()
            .map(|t| t.predict(x))
            .collect::<Result<Vec<_>>>()?;

        let n_trees = per_tree.len() as f64;
        let predictions = (0..x.nrows())
            .map(|i| match self.task {
                Task::Regression => per_tree.iter().map(|p| p[i]).sum::<f64>() / n_trees,
                Task::Classification => majority_label(per_tree.iter().map(|p| p[i])).unwrap_or(f64::NAN),
            })
            .collect();
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_classifier() {
        let x = array![[0.0, 0.0], [0.1, 0.1], [0.2, 0.2], [1.0, 1.0], [1.1, 1.1], [1.2, 1.2]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut rf = RandomForest::new(Task::Classification).with_n_estimators(25);
        rf.fit(&x, &y).unwrap();
        assert_eq!(rf.n_trees(), 25);
        assert_eq!(rf.predict(&array![[0.05, 0.05], [1.15, 1.15]]).unwrap().to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_regressor() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| i as f64);
        let y = x.column(0).mapv(|v| 2.0 * v);
        let mut rf = RandomForest::new(Task::Regression).with_n_estimators(20);
        rf.fit(&x, &y).unwrap();
        let pred = rf.predict(&x).unwrap();
        let mse = pred.iter().zip(y.iter()).map(|(p, a)| (p - a).powi(2)).sum::<f64>() / 30.0;
        assert!(mse < 10.0, "MSE too high: {}", mse);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let x = Array2::from_shape_fn((40, 3), |(i, j)| ((i * 7 + j * 3) % 13) as f64);
        let y = Array1::from_shape_fn(40, |i| (i % 4) as f64);
        let mut a = RandomForest::new(Task::Classification).with_n_estimators(15).with_random_state(3);
        let mut b = RandomForest::new(Task::Classification).with_n_estimators(15).with_random_state(3);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(10), 4);
        assert_eq!(MaxFeatures::Log2.resolve(8), 3);
        assert_eq!(MaxFeatures::Fixed(20).resolve(5), 5);
        assert_eq!(MaxFeatures::All.resolve(7), 7);
        assert_eq!(MaxFeatures::Fraction(0.01).resolve(7), 1);
    }

    #[test]
    fn test_predict_before_fit() {
        let rf = RandomForest::new(Task::Regression);
        assert!(matches!(rf.predict(&array![[1.0]]), Err(JobPowerError::ModelNotFitted)));
    }
}
