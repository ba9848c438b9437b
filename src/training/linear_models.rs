//! Linear model implementations

use super::{check_features, check_training_data, class_index, class_labels, Estimator};
use crate::error::{JobPowerError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Solve the symmetric positive-definite system `a x = b` by Cholesky
/// factorization. Returns `None` when `a` is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    // a = L * L^T
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if !(diag > 0.0) {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // L^T x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Normal equations `(X^T X + alpha I) w = X^T y`.
///
/// A rank-deficient system (constant or duplicated columns) is retried with a
/// small diagonal jitter.
fn solve_normal_equations(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Result<Array1<f64>> {
    let n_features = x.ncols();
    let mut xtx = x.t().dot(x);
    for i in 0..n_features {
        xtx[[i, i]] += alpha;
    }
    let xty = x.t().dot(y);

    if let Some(w) = cholesky_solve(&xtx, &xty) {
        return Ok(w);
    }

    let mean_diag = xtx.diag().iter().map(|v| v.abs()).sum::<f64>() / n_features.max(1) as f64;
    let jitter = (1e-8 * mean_diag).max(1e-12);
    for i in 0..n_features {
        xtx[[i, i]] += jitter;
    }
    cholesky_solve(&xtx, &xty)
        .ok_or_else(|| JobPowerError::Training("normal equations are singular".into()))
}

/// Column means of `x` and the mean of `y`, used to fit the intercept
fn center(x: &Array2<f64>, y: &Array1<f64>) -> (Array2<f64>, Array1<f64>, Array1<f64>, f64) {
    let x_mean = x
        .mean_axis(Axis(0))
        .unwrap_or_else(|| Array1::zeros(x.ncols()));
    let y_mean = y.mean().unwrap_or(0.0);
    let xc = x - &x_mean.view().insert_axis(Axis(0));
    let yc = y - y_mean;
    (xc, yc, x_mean, y_mean)
}

/// Fitted weights of a linear regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LinearFit {
    coefficients: Array1<f64>,
    intercept: f64,
}

impl LinearFit {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_features(self.coefficients.len(), x)?;
        Ok(x.dot(&self.coefficients) + self.intercept)
    }
}

/// Ordinary least squares
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinearRegression {
    fitted: Option<LinearFit>,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.coefficients)
    }

    pub fn intercept(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.intercept)
    }
}

impl Estimator for LinearRegression {
    fn name(&self) -> &str {
        "Linear Regression"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y)?;
        let (xc, yc, x_mean, y_mean) = center(x, y);
        let coefficients = solve_normal_equations(&xc, &yc, 0.0)?;
        let intercept = y_mean - coefficients.dot(&x_mean);
        self.fitted = Some(LinearFit { coefficients, intercept });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.fitted.as_ref().ok_or(JobPowerError::ModelNotFitted)?.predict(x)
    }
}

/// L2-regularized least squares
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeRegression {
    pub alpha: f64,
    fitted: Option<LinearFit>,
}

impl Default for RidgeRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self { alpha, fitted: None }
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.coefficients)
    }
}

impl Estimator for RidgeRegression {
    fn name(&self) -> &str {
        "Ridge"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y)?;
        if !(self.alpha >= 0.0) {
            return Err(JobPowerError::InvalidParameter {
                name: "alpha".into(),
                value: self.alpha.to_string(),
                reason: "must be non-negative".into(),
            });
        }
        let (xc, yc, x_mean, y_mean) = center(x, y);
        let coefficients = solve_normal_equations(&xc, &yc, self.alpha)?;
        let intercept = y_mean - coefficients.dot(&x_mean);
        self.fitted = Some(LinearFit { coefficients, intercept });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.fitted.as_ref().ok_or(JobPowerError::ModelNotFitted)?.predict(x)
    }
}

/// L1-regularized least squares fitted by cyclic coordinate descent.
///
/// Minimizes `(1 / 2n) ||y - Xw||^2 + alpha ||w||_1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LassoRegression {
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
    fitted: Option<LinearFit>,
    n_iter: usize,
}

impl Default for LassoRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl LassoRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            max_iter: 1000,
            tol: 1e-4,
            fitted: None,
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

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.fitted.as_ref().map(|f| &f.coefficients)
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }
}

fn soft_threshold(v: f64, lambda: f64) -> f64 {
    if v > lambda {
        v - lambda
    } else if v < -lambda {
        v + lambda
    } else {
        0.0
    }
}

impl Estimator for LassoRegression {
    fn name(&self) -> &str {
        "Lasso"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y)?;
        if !(self.alpha >= 0.0) {
            return Err(JobPowerError::InvalidParameter {
                name: "alpha".into(),
                value: self.alpha.to_string(),
                reason: "must be non-negative".into(),
            });
        }

        let (xc, yc, x_mean, y_mean) = center(x, y);
        let n = xc.nrows() as f64;
        let n_features = xc.ncols();
        let col_sq: Vec<f64> = xc.columns().into_iter().map(|c| c.dot(&c) / n).collect();

        let mut w = Array1::<f64>::zeros(n_features);
        let mut residual = yc;
        self.n_iter = 0;

        for iter in 0..self.max_iter {
            self.n_iter = iter + 1;
            let mut max_change = 0.0f64;
            let mut max_weight = 0.0f64;

            for j in 0..n_features {
                if col_sq[j] == 0.0 {
                    continue;
                }
                let col = xc.column(j);
                let rho = col.dot(&residual) / n + col_sq[j] * w[j];
                let new_w = soft_threshold(rho, self.alpha) / col_sq[j];
                let delta = new_w - w[j];
                if delta != 0.0 {
                    residual.scaled_add(-delta, &col);
                    w[j] = new_w;
                }
                max_change = max_change.max(delta.abs());
                max_weight = max_weight.max(new_w.abs());
            }

            if max_weight == 0.0 || max_change <= self.tol * max_weight {
                break;
            }
        }

        let intercept = y_mean - w.dot(&x_mean);
        self.fitted = Some(LinearFit { coefficients: w, intercept });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.fitted.as_ref().ok_or(JobPowerError::ModelNotFitted)?.predict(x)
    }
}

/// Multinomial logistic regression trained by full-batch gradient descent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// L2 penalty on the weights
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
    pub learning_rate: f64,
    weights: Option<Array2<f64>>,
    bias: Option<Array1<f64>>,
    classes: Vec<f64>,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LogisticRegression {
    pub fn new() -> Self {
        Self {
            alpha: 1e-4,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.5,
            weights: None,
            bias: None,
            classes: Vec::new(),
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    /// Row-wise softmax, shifted by the row max for stability
    fn softmax(logits: &mut Array2<f64>) {
        for mut row in logits.rows_mut() {
            let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }
    }

    /// Class probabilities, one column per entry of [`classes`](Self::classes)
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let weights = self.weights.as_ref().ok_or(JobPowerError::ModelNotFitted)?;
        let bias = self.bias.as_ref().ok_or(JobPowerError::ModelNotFitted)?;
        check_features(weights.nrows(), x)?;
        let mut logits = x.dot(weights) + &bias.view().insert_axis(Axis(0));
        Self::softmax(&mut logits);
        Ok(logits)
    }
}

impl Estimator for LogisticRegression {
    fn name(&self) -> &str {
        "Logistic Regression"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_training_data(x, y)?;
        let classes = class_labels(y);
        let (n_samples, n_features) = x.dim();
        let n_classes = classes.len();

        // One-hot targets
        let mut targets = Array2::<f64>::zeros((n_samples, n_classes));
        for (i, &label) in y.iter().enumerate() {
            if let Some(c) = class_index(&classes, label) {
                targets[[i, c]] = 1.0;
            }
        }

        let mut weights = Array2::<f64>::zeros((n_features, n_classes));
        let mut bias = Array1::<f64>::zeros(n_classes);

        if n_classes > 1 {
            let n = n_samples as f64;
            for _ in 0..self.max_iter {
                let mut probs = x.dot(&weights) + &bias.view().insert_axis(Axis(0));
                Self::softmax(&mut probs);
                let errors = probs - &targets;

                let dw = x.t().dot(&errors) / n + &(&weights * self.alpha);
                let db = errors.sum_axis(Axis(0)) / n;

                let grad_norm = (dw.mapv(|v| v * v).sum() + db.mapv(|v| v * v).sum()).sqrt();
                if grad_norm < self.tol {
                    break;
                }
                weights.scaled_add(-self.learning_rate, &dw);
                bias.scaled_add(-self.learning_rate, &db);
            }
        }

        self.weights = Some(weights);
        self.bias = Some(bias);
        self.classes = classes;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |acc, (i, &p)| if p > acc.1 { (i, p) } else { acc });
                self.classes[best.0]
            })
            .collect())
    }
}
