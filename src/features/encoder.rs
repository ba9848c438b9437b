//! Integer codes for categorical job attributes

use super::{FeatureFrame, FeatureValue, JobFeature};
use crate::data::JobTable;
use crate::error::{JobPowerError, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Maps each category to its position in first-seen row order.
///
/// The first distinct value of a column gets code 0, the next new value 1,
/// and so on, so the same table always encodes the same way.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryEncoder {
    categories: BTreeMap<JobFeature, Vec<String>>,
    is_fitted: bool,
}

impl CategoryEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn the categories of every categorical feature in `features`
    pub fn fit(&mut self, table: &JobTable, features: &[JobFeature]) -> Result<&mut Self> {
        self.categories.clear();
        for &feature in features.iter().filter(|f| f.is_categorical()) {
            let mut seen: HashMap<&str, usize> = HashMap::new();
            let mut order: Vec<String> = Vec::new();
            for record in table.iter() {
                if let FeatureValue::Category(v) = feature.value(record) {
                    if !seen.contains_key(v) {
                        seen.insert(v, order.len());
                        order.push(v.to_string());
                    }
                }
            }
            debug!(feature = feature.name(), n_categories = order.len(), "Fitted category codes");
            self.categories.insert(feature, order);
        }
        self.is_fitted = true;
        Ok(self)
    }

    /// Encode `features` into a frame with one column per feature
    pub fn transform(&self, table: &JobTable, features: &[JobFeature]) -> Result<FeatureFrame> {
        if !self.is_fitted {
            return Err(JobPowerError::ModelNotFitted);
        }

        let lookups: BTreeMap<JobFeature, HashMap<&str, usize>> = self
            .categories
            .iter()
            .map(|(f, cats)| {
                let codes = cats.iter().enumerate().map(|(i, c)| (c.as_str(), i)).collect();
                (*f, codes)
            })
            .collect();

        let mut data = Array2::zeros((table.len(), features.len()));
        for (j, feature) in features.iter().enumerate() {
            let codes = if feature.is_categorical() {
                Some(lookups.get(feature).ok_or_else(|| {
                    JobPowerError::Schema(format!("feature '{}' was not fitted", feature))
                })?)
            } else {
                None
            };
            for (i, record) in table.iter().enumerate() {
                data[[i, j]] = match (feature.value(record), codes) {
                    (FeatureValue::Numeric(v), _) => v,
                    (FeatureValue::Category(v), Some(codes)) => *codes.get(v).ok_or_else(|| {
                        JobPowerError::Schema(format!(
                            "unseen category '{}' in feature '{}'",
                            v, feature
                        ))
                    })? as f64,
                    (FeatureValue::Category(_), None) => {
                        return Err(JobPowerError::Schema(format!(
                            "feature '{}' has no category codes",
                            feature
                        )))
                    }
                };
            }
        }

        FeatureFrame::new(features.iter().map(|f| f.name().to_string()).collect(), data)
    }

    pub fn fit_transform(&mut self, table: &JobTable, features: &[JobFeature]) -> Result<FeatureFrame> {
        self.fit(table, features)?;
        self.transform(table, features)
    }

    /// Categories of one feature in code order
    pub fn categories(&self, feature: JobFeature) -> Option<&[String]> {
        self.categories.get(&feature).map(|c| c.as_slice())
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}

/// Encode `features` of `table` with a freshly fitted [`CategoryEncoder`]
pub fn encode_categorical(table: &JobTable, features: &[JobFeature]) -> Result<FeatureFrame> {
    CategoryEncoder::new().fit_transform(table, features)
}
