//! K-Means with k-means++ seeding and restarts

use crate::error::{JobPowerError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// K-Means clustering.
///
/// Every restart draws its k-means++ seeds from one `ChaCha8Rng` stream seeded
/// with `random_state`, so a fit is fully reproducible. The restart with the
/// lowest inertia wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeans {
    pub n_clusters: usize,
    pub max_iter: usize,
    /// Stop once the total centroid shift of an iteration drops below this
    pub tol: f64,
    pub n_init: usize,
    pub random_state: u64,
    centroids: Option<Array2<f64>>,
    labels: Option<Array1<usize>>,
    inertia: Option<f64>,
    n_iter: usize,
}

impl Default for KMeans {
    fn default() -> Self {
        Self::new(3)
    }
}

struct LloydRun {
    centroids: Array2<f64>,
    labels: Array1<usize>,
    inertia: f64,
    n_iter: usize,
}

impl KMeans {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iter: 300,
            tol: 1e-4,
            n_init: 10,
            random_state: 42,
            centroids: None,
            labels: None,
            inertia: None,
            n_iter: 0,
        }
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn with_n_init(mut self, n_init: usize) -> Self {
        self.n_init = n_init.max(1);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Fit the model (unsupervised, rows are samples)
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        if self.n_clusters == 0 {
            return Err(JobPowerError::InvalidParameter {
                name: "n_clusters".into(),
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        if n_samples < self.n_clusters {
            return Err(JobPowerError::Training(format!(
                "n_samples ({}) < n_clusters ({})",
                n_samples, self.n_clusters
            )));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(JobPowerError::InvalidInput(
                "k-means input contains non-finite values".into(),
            ));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut best: Option<LloydRun> = None;
        for _ in 0..self.n_init.max(1) {
            let init = kmeans_pp_init(x, self.n_clusters, &mut rng);
            let run = self.lloyd(x, init);
            if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
                best = Some(run);
            }
        }

        let best = best.ok_or_else(|| JobPowerError::Training("k-means produced no run".into()))?;
        self.centroids = Some(best.centroids);
        self.labels = Some(best.labels);
        self.inertia = Some(best.inertia);
        self.n_iter = best.n_iter;
        Ok(self)
    }

    fn lloyd(&self, x: &Array2<f64>, mut centroids: Array2<f64>) -> LloydRun {
        let n_samples = x.nrows();
        let k = self.n_clusters;
        let mut labels = assign(x, &centroids);
        let mut n_iter = 0;

        for iter in 0..self.max_iter {
            n_iter = iter + 1;

            let mut sums = Array2::<f64>::zeros(centroids.dim());
            let mut counts = vec![0usize; k];
            for (i, &c) in labels.iter().enumerate() {
                counts[c] += 1;
                let mut row = sums.row_mut(c);
                row += &x.row(i);
            }

            let mut new_centroids = sums;
            let mut reseeds: Option<std::vec::IntoIter<usize>> = None;
            for c in 0..k {
                if counts[c] > 0 {
                    new_centroids.row_mut(c).mapv_inplace(|v| v / counts[c] as f64);
                } else {
                    // Empty clusters take the worst-served points, one point each
                    let order = reseeds.get_or_insert_with(|| farthest_first(x, &centroids, &labels).into_iter());
                    let far = order.next().unwrap_or(c % n_samples);
                    new_centroids.row_mut(c).assign(&x.row(far));
                }
            }

            let shift = centroids
                .iter()
                .zip(new_centroids.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                .sqrt();

            centroids = new_centroids;
            let new_labels = assign(x, &centroids);
            let changed = new_labels.iter().zip(labels.iter()).any(|(a, b)| a != b);
            labels = new_labels;

            if !changed || shift < self.tol {
                break;
            }
        }

        let inertia = inertia(x, &centroids, &labels);
        LloydRun {
            centroids,
            labels,
            inertia,
            n_iter,
        }
    }

    /// Assign new rows to the nearest fitted centroid
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let centroids = self.centroids.as_ref().ok_or(JobPowerError::ModelNotFitted)?;
        if x.ncols() != centroids.ncols() {
            return Err(JobPowerError::shape_mismatch(centroids.ncols(), x.ncols(), "n_features"));
        }
        Ok(assign(x, centroids))
    }

    pub fn centroids(&self) -> Option<&Array2<f64>> {
        self.centroids.as_ref()
    }

    pub fn labels(&self) -> Option<&Array1<usize>> {
        self.labels.as_ref()
    }

    /// Sum of squared distances to the nearest centroid
    pub fn inertia(&self) -> Option<f64> {
        self.inertia
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn is_fitted(&self) -> bool {
        self.centroids.is_some()
    }

    /// Fitted labels renumbered so that cluster 0 has the smallest centroid
    /// on the first feature, cluster 1 the next, and so on
    pub fn ordered_labels(&self) -> Result<Vec<usize>> {
        let centroids = self.centroids.as_ref().ok_or(JobPowerError::ModelNotFitted)?;
        let labels = self.labels.as_ref().ok_or(JobPowerError::ModelNotFitted)?;
        let mut by_value: Vec<usize> = (0..centroids.nrows()).collect();
        by_value.sort_by(|&a, &b| centroids[[a, 0]].total_cmp(&centroids[[b, 0]]));
        let mut rank = vec![0usize; by_value.len()];
        for (r, &c) in by_value.iter().enumerate() {
            rank[c] = r;
        }
        Ok(labels.iter().map(|&l| rank[l]).collect())
    }
}

/// k-means++: each new seed is drawn with probability proportional to its
/// squared distance from the nearest seed picked so far
fn kmeans_pp_init(x: &Array2<f64>, k: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
    let n_samples = x.nrows();
    let mut centroids = Array2::zeros((k, x.ncols()));

    let first = rng.gen_range(0..n_samples);
    centroids.row_mut(0).assign(&x.row(first));
    let mut dists: Vec<f64> = (0..n_samples)
        .map(|i| sq_dist(&x.row(i), &centroids.row(0)))
        .collect();

    for c in 1..k {
        let total: f64 = dists.iter().sum();
        let chosen = if total <= 0.0 {
            rng.gen_range(0..n_samples)
        } else {
            let r = rng.gen::<f64>() * total;
            let mut cumulative = 0.0;
            let mut chosen = dists.iter().rposition(|&d| d > 0.0).unwrap_or(0);
            for (i, &d) in dists.iter().enumerate() {
                cumulative += d;
                if d > 0.0 && cumulative >= r {
                    chosen = i;
                    break;
                }
            }
            chosen
        };
        centroids.row_mut(c).assign(&x.row(chosen));
        for (i, d) in dists.iter_mut().enumerate() {
            *d = d.min(sq_dist(&x.row(i), &centroids.row(c)));
        }
    }

    centroids
}

fn assign(x: &Array2<f64>, centroids: &Array2<f64>) -> Array1<usize> {
    let labels: Vec<usize> = (0..x.nrows())
        .into_par_iter()
        .map(|i| {
            let row = x.row(i);
            let mut best_c = 0;
            let mut best_dist = f64::MAX;
            for c in 0..centroids.nrows() {
                let d = sq_dist(&row, &centroids.row(c));
                if d < best_dist {
                    best_dist = d;
                    best_c = c;
                }
            }
            best_c
        })
        .collect();
    Array1::from_vec(labels)
}

/// Row indices ordered by distance to their assigned centroid, farthest
/// first; ties keep the lower index first
fn farthest_first(x: &Array2<f64>, centroids: &Array2<f64>, labels: &Array1<usize>) -> Vec<usize> {
    let dists: Vec<f64> = (0..x.nrows())
        .map(|i| sq_dist(&x.row(i), &centroids.row(labels[i])))
        .collect();
    let mut order: Vec<usize> = (0..x.nrows()).collect();
    order.sort_by(|&a, &b| dists[b].total_cmp(&dists[a]));
    order
}

fn inertia(x: &Array2<f64>, centroids: &Array2<f64>, labels: &Array1<usize>) -> f64 {
    labels
        .iter()
        .enumerate()
        .map(|(i, &c)| sq_dist(&x.row(i), &centroids.row(c)))
        .sum()
}

fn sq_dist(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_kmeans_two_blobs() {
        let x = array![
            [1.0, 1.0], [1.5, 1.5], [1.2, 1.3],
            [8.0, 8.0], [8.5, 8.5], [8.2, 8.3],
        ];
        let mut model = KMeans::new(2);
        model.fit(&x).unwrap();
        let labels = model.labels().unwrap();
        assert_eq!(labels[0], labels[1]);
        assert_eq!(labels[0], labels[2]);
        assert_eq!(labels[3], labels[4]);
        assert_eq!(labels[3], labels[5]);
        assert_ne!(labels[0], labels[3]);
    }

    #[test]
    fn test_kmeans_predict() {
        let x = array![[0.0, 0.0], [0.5, 0.5], [10.0, 10.0], [10.5, 10.5]];
        let mut model = KMeans::new(2);
        model.fit(&x).unwrap();
        let labels = model.predict(&array![[0.1, 0.1], [10.1, 10.1]]).unwrap();
        assert_ne!(labels[0], labels[1]);
    }

    #[test]
    fn test_kmeans_reproducible() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [30.0], [31.0]];
        let mut a = KMeans::new(3).with_random_state(9);
        let mut b = KMeans::new(3).with_random_state(9);
        a.fit(&x).unwrap();
        b.fit(&x).unwrap();
        assert_eq!(a.labels(), b.labels());
        assert_eq!(a.inertia(), b.inertia());
    }

    #[test]
    fn test_ordered_labels_follow_centroids() {
        let x = array![[50.0], [1.0], [51.0], [2.0], [100.0], [101.0]];
        let mut model = KMeans::new(3);
        model.fit(&x).unwrap();
        assert_eq!(model.ordered_labels().unwrap(), vec![1, 0, 1, 0, 2, 2]);
    }

    #[test]
    fn test_inertia_zero_when_k_equals_n() {
        let x = array![[0.0], [5.0], [9.0]];
        let mut model = KMeans::new(3);
        model.fit(&x).unwrap();
        assert_eq!(model.inertia().unwrap(), 0.0);
    }

    #[test]
    fn test_farthest_first_order() {
        let x = array![[0.0], [1.0], [10.0], [20.0], [10.0]];
        let centroids = array![[0.0], [100.0]];
        let labels = Array1::from_vec(vec![0, 0, 0, 0, 0]);
        assert_eq!(farthest_first(&x, &centroids, &labels), vec![3, 2, 4, 1, 0]);
    }

    #[test]
    fn test_empty_clusters_reseed_to_distinct_points() {
        // Every row lands in cluster 0, so clusters 1 and 2 are empty together
        let x = array![[0.0], [1.0], [10.0], [20.0]];
        let init = array![[0.0], [100.0], [200.0]];
        let run = KMeans::new(3).lloyd(&x, init);

        let mut counts = [0usize; 3];
        for &l in run.labels.iter() {
            counts[l] += 1;
        }
        assert!(counts.iter().all(|&n| n > 0), "empty cluster left: {:?}", counts);
        assert_ne!(run.centroids[[1, 0]], run.centroids[[2, 0]]);
        assert_eq!(run.labels.to_vec(), vec![0, 0, 2, 1]);
        assert!((run.inertia - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_too_few_samples() {
        let x = array![[0.0], [1.0]];
        assert!(KMeans::new(3).fit(&x).is_err());
    }
}
