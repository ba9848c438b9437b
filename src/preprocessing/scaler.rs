//! Min-max feature scaling

use crate::error::{JobPowerError, Result};
use crate::features::FeatureFrame;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Observed range of one fitted column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRange {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

impl ColumnRange {
    fn span(&self) -> f64 {
        self.max - self.min
    }

    fn scale(&self, v: f64) -> f64 {
        let span = self.span();
        if span == 0.0 {
            0.0
        } else {
            (v - self.min) / span
        }
    }

    fn unscale(&self, v: f64) -> f64 {
        v * self.span() + self.min
    }
}

/// Min-Max scaler: `(x - min) / (max - min)` per column.
///
/// A constant column maps to 0. The fitted ranges are kept, keyed by column
/// name, so new data can be scaled the same way later.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MinMaxScaler {
    ranges: Vec<ColumnRange>,
    is_fitted: bool,
}

impl MinMaxScaler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fit the scaler to every column of the frame
    pub fn fit(&mut self, frame: &FeatureFrame) -> Result<&mut Self> {
        if frame.n_rows() == 0 {
            return Err(JobPowerError::InvalidInput("cannot fit a scaler on zero rows".into()));
        }
        if frame.data().iter().any(|v| !v.is_finite()) {
            return Err(JobPowerError::InvalidInput("scaler input contains non-finite values".into()));
        }

        self.ranges = frame
            .names()
            .iter()
            .zip(frame.data().columns())
            .map(|(name, col)| ColumnRange {
                name: name.clone(),
                min: col.iter().copied().fold(f64::INFINITY, f64::min),
                max: col.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            })
            .collect();
        self.is_fitted = true;
        Ok(self)
    }

    pub fn transform(&self, frame: &FeatureFrame) -> Result<Array2<f64>> {
        self.apply(frame, ColumnRange::scale)
    }

    pub fn fit_transform(&mut self, frame: &FeatureFrame) -> Result<Array2<f64>> {
        self.fit(frame)?;
        self.transform(frame)
    }

    /// Map scaled values back to the original units
    pub fn inverse_transform(&self, frame: &FeatureFrame) -> Result<Array2<f64>> {
        self.apply(frame, ColumnRange::unscale)
    }

    fn apply(&self, frame: &FeatureFrame, f: fn(&ColumnRange, f64) -> f64) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(JobPowerError::ModelNotFitted);
        }
        if frame.n_cols() != self.ranges.len() {
            return Err(JobPowerError::shape_mismatch(self.ranges.len(), frame.n_cols(), "n_features"));
        }
        if let Some((range, name)) = self
            .ranges
            .iter()
            .zip(frame.names())
            .find(|(r, n)| &r.name != *n)
        {
            return Err(JobPowerError::Schema(format!(
                "column '{}' was fitted where '{}' is given",
                range.name, name
            )));
        }

        let mut out = frame.data().clone();
        for (mut col, range) in out.columns_mut().into_iter().zip(self.ranges.iter()) {
            col.mapv_inplace(|v| f(range, v));
        }
        Ok(out)
    }

    /// Fitted ranges in column order
    pub fn ranges(&self) -> &[ColumnRange] {
        &self.ranges
    }

    pub fn range(&self, name: &str) -> Option<&ColumnRange> {
        self.ranges.iter().find(|r| r.name == name)
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}

/// Scale the named columns of `frame` and keep the fitted scaler
pub fn min_max_scale(frame: &FeatureFrame, columns: &[String]) -> Result<(Array2<f64>, MinMaxScaler)> {
    let selected = frame.select(columns)?;
    let mut scaler = MinMaxScaler::new();
    let scaled = scaler.fit_transform(&selected)?;
    Ok((scaled, scaler))
}
