//! CART decision tree for regression (variance) and classification (Gini)

use super::{check_features, check_training_data, class_index, class_labels, Estimator, Task};
use crate::error::{JobPowerError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    /// Rows with `x[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

impl TreeNode {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

/// Running statistics of the rows on one side of a candidate split
#[derive(Clone)]
enum SideStats {
    Variance { n: usize, sum: f64, sq_sum: f64 },
    Gini { n: usize, counts: Vec<usize> },
}

impl SideStats {
    fn empty(task: Task, n_classes: usize) -> Self {
        match task {
            Task::Regression => SideStats::Variance { n: 0, sum: 0.0, sq_sum: 0.0 },
            Task::Classification => SideStats::Gini { n: 0, counts: vec![0; n_classes] },
        }
    }

    fn add(&mut self, target: f64) {
        match self {
            SideStats::Variance { n, sum, sq_sum } => {
                *n += 1;
                *sum += target;
                *sq_sum += target * target;
            }
            SideStats::Gini { n, counts } => {
                *n += 1;
                counts[target as usize] += 1;
            }
        }
    }

    fn remove(&mut self, target: f64) {
        match self {
            SideStats::Variance { n, sum, sq_sum } => {
                *n -= 1;
                *sum -= target;
                *sq_sum -= target * target;
            }
            SideStats::Gini { n, counts } => {
                *n -= 1;
                counts[target as usize] -= 1;
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            SideStats::Variance { n, .. } | SideStats::Gini { n, .. } => *n,
        }
    }

    fn impurity(&self) -> f64 {
        match self {
            SideStats::Variance { n, sum, sq_sum } => {
                if *n == 0 {
                    return 0.0;
                }
                let n = *n as f64;
                (sq_sum / n - (sum / n).powi(2)).max(0.0)
            }
            SideStats::Gini { n, counts } => {
                if *n == 0 {
                    return 0.0;
                }
                let n = *n as f64;
                1.0 - counts.iter().map(|&c| (c as f64 / n).powi(2)).sum::<f64>()
            }
        }
    }
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

/// CART decision tree.
///
/// Classification targets are mapped to class indices during fit and mapped
/// back on predict; a leaf predicts its majority class (ties to the smallest
/// label). Regression leaves predict the mean target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub task: Task,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per node, drawn at random; all of them when `None`
    pub max_features: Option<usize>,
    pub random_state: u64,
    root: Option<TreeNode>,
    n_features: usize,
    classes: Vec<f64>,
}

impl DecisionTree {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: 42,
            root: None,
            n_features: 0,
            classes: Vec::new(),
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }

    pub fn n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::n_leaves)
    }

    fn leaf(&self, targets: &[f64], indices: &[usize]) -> TreeNode {
        let value = match self.task {
            Task::Regression => indices.iter().map(|&i| targets[i]).sum::<f64>() / indices.len() as f64,
            Task::Classification => {
                let mut counts = vec![0usize; self.classes.len()];
                for &i in indices {
                    counts[targets[i] as usize] += 1;
                }
                // max_by_key keeps the last maximum, so scan in reverse
                let best = counts
                    .iter()
                    .enumerate()
                    .rev()
                    .max_by_key(|&(_, c)| *c)
                    .map_or(0, |(i, _)| i);
                self.classes[best]
            }
        };
        TreeNode::Leaf {
            value,
            n_samples: indices.len(),
        }
    }

    fn build(
        &self,
        x: &Array2<f64>,
        targets: &[f64],
        indices: &mut [usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> TreeNode {
        let n_samples = indices.len();
        let stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d);
        if stop {
            return self.leaf(targets, indices);
        }

        let mut parent = SideStats::empty(self.task, self.classes.len());
        for &i in indices.iter() {
            parent.add(targets[i]);
        }
        let parent_impurity = parent.impurity();
        if parent_impurity <= 0.0 {
            return self.leaf(targets, indices);
        }

        let mut features: Vec<usize> = (0..x.ncols()).collect();
        if let Some(m) = self.max_features {
            if m < features.len() {
                features.shuffle(rng);
                features.truncate(m);
            }
        }

        let best = self.best_split(x, targets, indices, &features, &parent);
        let best = match best {
            Some(b) if b.impurity < parent_impurity => b,
            _ => return self.leaf(targets, indices),
        };

        // Partition in place: left block first
        let mut split_at = 0;
        for k in 0..n_samples {
            if x[[indices[k], best.feature]] <= best.threshold {
                indices.swap(k, split_at);
                split_at += 1;
            }
        }
        let (left_idx, right_idx) = indices.split_at_mut(split_at);
        let left = self.build(x, targets, left_idx, depth + 1, rng);
        let right = self.build(x, targets, right_idx, depth + 1, rng);

        TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: Box::new(left),
            right: Box::new(right),
            n_samples,
        }
    }

    /// Lowest weighted child impurity over the candidate features.
    /// Each feature is swept once in sorted order.
    fn best_split(
        &self,
        x: &Array2<f64>,
        targets: &[f64],
        indices: &[usize],
        features: &[usize],
        parent: &SideStats,
    ) -> Option<BestSplit> {
        let n = indices.len();
        let mut best: Option<BestSplit> = None;
        let mut order: Vec<usize> = indices.to_vec();

        for &f in features {
            order.sort_by(|&a, &b| x[[a, f]].total_cmp(&x[[b, f]]));
            let mut left = SideStats::empty(self.task, self.classes.len());
            let mut right = parent.clone();

            for pos in 0..n - 1 {
                let i = order[pos];
                left.add(targets[i]);
                right.remove(targets[i]);

                let here = x[[i, f]];
                let next = x[[order[pos + 1], f]];
                if here == next {
                    continue;
                }
                if left.len() < self.min_samples_leaf || right.len() < self.min_samples_leaf {
                    continue;
                }

                let impurity = (left.len() as f64 * left.impurity()
                    + right.len() as f64 * right.impurity())
                    / n as f64;
                if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    let mid = here + (next - here) / 2.0;
                    best = Some(BestSplit {
                        feature: f,
                        threshold: if mid < next { mid } else { here },
                        impurity,
                    });
                }
            }
        }
        best
    }
}

impl Estimator for DecisionTree {
    fn name(&self) -> &str {
        "Decision Tree"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y)?;

        // Classification trees work on class indices internally
        let targets: Vec<f64> = match self.task {
            Task::Regression => {
                self.classes.clear();
                y.to_vec()
            }
            Task::Classification => {
                self.classes = class_labels(y);
                y.iter()
                    .map(|&v| class_index(&self.classes, v).map(|c| c as f64))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| JobPowerError::Training("label outside the fitted classes".into()))?
            }
        };

        self.n_features = x.ncols();
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut indices: Vec<usize> = (0..x.nrows()).collect();
        self.root = Some(self.build(x, &targets, &mut indices, 0, &mut rng));
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(JobPowerError::ModelNotFitted)?;
        check_features(self.n_features, x)?;
        Ok(x.rows().into_iter().map(|row| root.predict_row(row)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regression_tree_step_function() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = array![5.0, 5.0, 5.0, 20.0, 20.0, 20.0];
        let mut tree = DecisionTree::new(Task::Regression);
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict(&array![[0.0], [6.0], [7.0], [100.0]]).unwrap().to_vec(), vec![5.0, 5.0, 20.0, 20.0]);
    }

    #[test]
    fn test_classification_tree_fits_training_set() {
        let x = array![[0.0, 5.0], [1.0, 4.0], [2.0, 3.0], [3.0, 2.0], [4.0, 1.0], [5.0, 0.0]];
        let y = array![-1.0, -1.0, 2.0, 2.0, 0.0, 0.0];
        let mut tree = DecisionTree::new(Task::Classification);
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.n_leaves(), 3);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = Array2::from_shape_fn((32, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(32, |i| (i * i) as f64);
        let mut tree = DecisionTree::new(Task::Regression).with_max_depth(3);
        tree.fit(&x, &y).unwrap();
        assert!(tree.depth() <= 3);
        assert!(tree.n_leaves() <= 8);
    }

    #[test]
    fn test_majority_leaf_ties_to_smallest_label() {
        let x = array![[1.0], [1.0], [1.0], [1.0]];
        let y = array![4.0, 2.0, 4.0, 2.0];
        let mut tree = DecisionTree::new(Task::Classification);
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict(&array![[1.0]]).unwrap()[0], 2.0);
    }

    #[test]
    fn test_feature_subsampling_is_seeded() {
        let x = Array2::from_shape_fn((40, 4), |(i, j)| ((i * (j + 3)) % 11) as f64);
        let y = Array1::from_shape_fn(40, |i| (i % 3) as f64);
        let mut a = DecisionTree::new(Task::Classification).with_max_features(2).with_random_state(5);
        let mut b = DecisionTree::new(Task::Classification).with_max_features(2).with_random_state(5);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_wrong_feature_count() {
        let mut tree = DecisionTree::new(Task::Regression);
        tree.fit(&array![[1.0, 2.0], [2.0, 1.0]], &array![1.0, 2.0]).unwrap();
        assert!(tree.predict(&array![[1.0]]).is_err());
    }
}
